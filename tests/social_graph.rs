//! End-to-end runs of the social graph against an in-memory relay set.

mod common;

use common::*;
use flavorgraph::{GraphError, NetworkBuilder, SocialGraph};
use nostr_sdk::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn reciprocal_reacting_peer_scores_six_and_silent_peer_zero() {
    let root = Keys::generate();
    let a = Keys::generate();
    let b = Keys::generate();
    let relays = MockRelays::new(root.public_key());
    relays.publish(follow_list(&root, &[a.public_key(), b.public_key()]));
    relays.publish(follow_list(&a, &[root.public_key()]));
    relays.publish(reaction(&a, &root.public_key()));
    relays.publish(profile(&a, "alice"));
    relays.publish(profile(&b, "bob"));

    let graph = SocialGraph::new(test_config(4), relays.clone()).unwrap();
    let result = graph
        .compute_social_graph(&root.public_key().to_hex(), &CancellationToken::new())
        .await
        .unwrap();

    let network = &result.network;
    assert_eq!(network.len(), 2);

    let node_a = network.get(&a.public_key()).unwrap();
    assert_eq!(node_a.influence_score, 6);
    assert!(node_a.signals.reciprocal);
    assert_eq!(node_a.signals.inbound_reactions, 1);
    assert_eq!(
        node_a.profile.as_ref().and_then(|p| p.name.as_deref()),
        Some("alice")
    );

    let node_b = network.get(&b.public_key()).unwrap();
    assert_eq!(node_b.influence_score, 0);
    assert!(node_b.profile.is_none());
    assert!(relays.queries_for(0, &b.public_key()).is_empty());
}

#[tokio::test]
async fn zaps_relationships_groups_and_outbound_reactions_add_up() {
    let root = Keys::generate();
    let zapper = Keys::generate();
    let (c, d, e) = (Keys::generate(), Keys::generate(), Keys::generate());
    let stranger = Keys::generate();
    let rpk = root.public_key();
    let relays = MockRelays::new(rpk);

    relays.publish(follow_list(&root, &[c.public_key(), d.public_key(), e.public_key()]));
    relays.publish(follow_set(&root, "brunch", &[c.public_key(), d.public_key(), stranger.public_key()]));

    // c: zap via P tag (+4), friend (+5), root reacted (+2), one group (+1)
    relays.publish(zap_receipt(&zapper, &rpk, &c.public_key()));
    relays.publish(relationship(&root, &c.public_key(), &["friend"]));
    relays.publish(reaction(&root, &c.public_key()));

    // d: zap via embedded request (+4), trusted topic (+2), one group (+1)
    relays.publish(zap_receipt_with_request(&zapper, &rpk, &d, &rpk));
    relays.publish(relationship(&root, &d.public_key(), &["trusted-baking"]));

    // e: embedded request aimed elsewhere is not trusted, unknown category
    relays.publish(zap_receipt_with_request(&zapper, &rpk, &e, &stranger.public_key()));
    relays.publish(relationship(&root, &e.public_key(), &["acquaintance"]));

    let graph = SocialGraph::new(test_config(2), relays.clone()).unwrap();
    let result = graph
        .compute_social_graph(&rpk.to_hex(), &CancellationToken::new())
        .await
        .unwrap();
    let network = &result.network;

    assert_eq!(network.len(), 3);
    assert!(network.get(&stranger.public_key()).is_none());

    let node_c = network.get(&c.public_key()).unwrap();
    assert_eq!(node_c.groups, vec!["brunch".to_string()]);
    assert!(node_c.signals.zapped && node_c.signals.outbound_ack);
    assert_eq!(node_c.influence_score, 12);

    let node_d = network.get(&d.public_key()).unwrap();
    assert!(node_d.signals.zapped);
    assert_eq!(node_d.influence_score, 7);

    let node_e = network.get(&e.public_key()).unwrap();
    assert!(!node_e.signals.zapped);
    assert_eq!(node_e.signals.relationships, vec!["acquaintance".to_string()]);
    assert_eq!(node_e.influence_score, 0);

    let ranked: Vec<PublicKey> = network.ranked().iter().map(|n| n.peer).collect();
    assert_eq!(ranked, vec![c.public_key(), d.public_key(), e.public_key()]);
}

#[tokio::test]
async fn network_has_one_unscored_node_per_distinct_follow() {
    let root = Keys::generate();
    let peers: Vec<Keys> = (0..5).map(|_| Keys::generate()).collect();
    let mut follows: Vec<PublicKey> = peers.iter().map(|k| k.public_key()).collect();
    follows.push(peers[0].public_key());

    let relays = MockRelays::new(root.public_key());
    relays.publish(follow_list(&root, &follows));
    relays.publish(follow_set(&root, "bakers", &[peers[1].public_key()]));
    relays.publish(follow_set(&root, "grillers", &[peers[1].public_key(), peers[2].public_key()]));

    let graph = SocialGraph::new(test_config(2), relays.clone()).unwrap();
    let network = NetworkBuilder::new(graph.directory())
        .build(&root.public_key(), &[])
        .await;

    assert_eq!(network.len(), 5);
    assert!(network.nodes.iter().all(|n| n.influence_score == 0));
    assert_eq!(
        network.get(&peers[1].public_key()).unwrap().groups,
        vec!["bakers".to_string(), "grillers".to_string()]
    );
    assert_eq!(network.nodes[0].peer, peers[0].public_key());
}

#[tokio::test]
async fn fetches_never_exceed_the_worker_limit() {
    let root = Keys::generate();
    let peers: Vec<PublicKey> = (0..12).map(|_| Keys::generate().public_key()).collect();
    let relays = MockRelays::new(root.public_key());
    relays.publish(follow_list(&root, &peers));
    relays.set_query_delay(Duration::from_millis(15));
    relays.set_count_delay(Duration::from_millis(15));

    let mut config = test_config(3);
    config.ontology.top_n = 12;
    let graph = SocialGraph::new(config, relays.clone()).unwrap();
    let result = graph
        .compute_social_graph(&root.public_key().to_hex(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.network.len(), 12);
    let peak = relays.max_in_flight_peers();
    assert!(peak <= 3, "{peak} peers had queries in flight at once");
    assert!(peak >= 2, "peers were never fetched concurrently");
}

#[tokio::test]
async fn missing_relay_lists_fall_back_to_bootstrap() {
    let root = Keys::generate();
    let a = Keys::generate();
    let relays = MockRelays::new(root.public_key());
    relays.publish(follow_list(&root, &[a.public_key()]));

    let graph = SocialGraph::new(test_config(2), relays.clone()).unwrap();
    assert!(graph
        .directory()
        .relay_list(&root.public_key())
        .await
        .unwrap()
        .is_empty());

    let result = graph
        .compute_social_graph(&root.public_key().to_hex(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.network.len(), 1);

    let queries = relays.queries();
    assert!(!queries.is_empty());
    assert!(queries.iter().all(|(urls, _)| urls == &vec![BOOTSTRAP.to_string()]));
}

#[tokio::test]
async fn declared_relays_route_reads_and_writes() {
    let root = Keys::generate();
    let a = Keys::generate();
    let relays = MockRelays::new(root.public_key());
    relays.publish(follow_list(&root, &[a.public_key()]));
    relays.publish(relay_list(
        &a,
        &[("wss://a-in.test", Some("read")), ("wss://a-out.test/", Some("write"))],
    ));

    let graph = SocialGraph::new(test_config(2), relays.clone()).unwrap();
    graph
        .compute_social_graph(&root.public_key().to_hex(), &CancellationToken::new())
        .await
        .unwrap();

    let apk = a.public_key();
    for (urls, _) in relays.queries_for(10002, &apk) {
        assert_eq!(urls, vec![BOOTSTRAP.to_string()]);
    }
    for (urls, _) in relays.queries_for(3, &apk) {
        assert_eq!(urls, vec!["wss://a-out.test".to_string()]);
    }
    let label_queries = relays.queries_for(1985, &apk);
    assert!(!label_queries.is_empty());
    for (urls, _) in label_queries {
        assert_eq!(urls, vec!["wss://a-in.test".to_string()]);
    }
}

#[tokio::test]
async fn unreachable_peer_relays_only_zero_the_affected_signals() {
    let root = Keys::generate();
    let a = Keys::generate();
    let relays = MockRelays::new(root.public_key());
    relays.publish(follow_list(&root, &[a.public_key()]));
    relays.publish(relay_list(&a, &[("wss://down.test", None)]));
    relays.publish(follow_list(&a, &[root.public_key()]));
    relays.publish(reaction(&a, &root.public_key()));
    relays.set_unreachable("wss://down.test");

    let graph = SocialGraph::new(test_config(2), relays.clone()).unwrap();
    let result = graph
        .compute_social_graph(&root.public_key().to_hex(), &CancellationToken::new())
        .await
        .unwrap();

    let node = result.network.get(&a.public_key()).unwrap();
    assert!(!node.signals.reciprocal);
    assert_eq!(node.signals.inbound_reactions, 1);
    assert_eq!(node.influence_score, 1);
}

#[tokio::test(start_paused = true)]
async fn slow_counts_time_out_and_score_as_zero() {
    let root = Keys::generate();
    let a = Keys::generate();
    let relays = MockRelays::new(root.public_key());
    relays.publish(follow_list(&root, &[a.public_key()]));
    relays.publish(follow_list(&a, &[root.public_key()]));
    relays.publish(reaction(&a, &root.public_key()));
    relays.set_count_delay(Duration::from_secs(60));

    let graph = SocialGraph::new(test_config(2), relays.clone()).unwrap();
    let result = graph
        .compute_social_graph(&root.public_key().to_hex(), &CancellationToken::new())
        .await
        .unwrap();

    let node = result.network.get(&a.public_key()).unwrap();
    assert_eq!(node.signals.inbound_reactions, 0);
    assert_eq!(node.influence_score, 5);
}

#[tokio::test]
async fn top_peers_drive_the_ontology() {
    let root = Keys::generate();
    let top = Keys::generate();
    let quiet = Keys::generate();
    let relays = MockRelays::new(root.public_key());
    relays.publish(follow_list(&root, &[quiet.public_key(), top.public_key()]));
    relays.publish(follow_list(&top, &[root.public_key()]));

    relays.publish(labels(&top, &["gluten-free", "Tomato", "umami"]));
    relays.publish(curation(&top, "menu", &["Thai", "street food"]));
    relays.publish(interests(&top, &["Baking"]));
    relays.publish(labels(&quiet, &["garlic"]));
    relays.publish(curation(&quiet, "menu", &["italian"]));

    let mut config = test_config(2);
    config.ontology.top_n = 1;
    let graph = SocialGraph::new(config, relays.clone()).unwrap();
    let cancel = CancellationToken::new();
    let first = graph
        .compute_social_graph(&root.public_key().to_hex(), &cancel)
        .await
        .unwrap();

    let ontology = &first.ontology;
    assert_eq!(ontology.cuisines, set(&["thai"]));
    assert_eq!(ontology.ingredients, set(&["tomato"]));
    assert_eq!(
        ontology.categories,
        set(&["baking", "gluten-free", "street food", "umami"])
    );

    let second = graph
        .compute_social_graph(&root.public_key().to_hex(), &cancel)
        .await
        .unwrap();
    assert_eq!(second.ontology, first.ontology);
}

#[tokio::test]
async fn invalid_root_fails_before_any_query() {
    let relays = MockRelays::new(Keys::generate().public_key());
    let graph = SocialGraph::new(test_config(2), relays.clone()).unwrap();

    let err = graph
        .compute_social_graph("npub1notakey", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidRoot { .. }));
    assert_eq!(relays.query_count(), 0);
}

#[tokio::test]
async fn already_cancelled_run_does_no_work() {
    let root = Keys::generate();
    let relays = MockRelays::new(root.public_key());
    let graph = SocialGraph::new(test_config(2), relays.clone()).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = graph
        .compute_social_graph(&root.public_key().to_hex(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Cancelled));
    assert_eq!(relays.query_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_a_stalled_run() {
    let root = Keys::generate();
    let peers: Vec<PublicKey> = (0..4).map(|_| Keys::generate().public_key()).collect();
    let relays = MockRelays::new(root.public_key());
    relays.publish(follow_list(&root, &peers));

    relays.set_query_delay(Duration::from_secs(3600));

    let graph = SocialGraph::new(test_config(2), relays.clone()).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = graph
        .compute_social_graph(&root.public_key().to_hex(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Cancelled));
}

#[tokio::test]
async fn shutdown_disconnects_the_transport() {
    let relays = MockRelays::new(Keys::generate().public_key());
    let graph = SocialGraph::new(test_config(2), relays.clone()).unwrap();
    graph.shutdown().await;
    assert!(relays.is_disconnected());
}

#[test]
fn invalid_config_is_rejected() {
    let relays = MockRelays::new(Keys::generate().public_key());
    let mut config = test_config(2);
    config.ontology.top_n = 0;
    assert!(matches!(
        SocialGraph::new(config, relays),
        Err(GraphError::Config(_))
    ));
}
