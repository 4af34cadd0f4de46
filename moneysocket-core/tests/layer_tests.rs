//! Integration tests for the generic layers stacked on a loopback transport.

use moneysocket_core::layer::{
    ConsumerLayer, ConsumerNexus, RendezvousLayer, TransactLayer, TransactNexus,
};
use moneysocket_core::nexus::nexus_chain;
use moneysocket_core::test_utils::{
    provider_responder, test_location, test_provider_info, test_seed, LoopbackTransport,
    TestFixtures,
};
use moneysocket_core::{
    AboveLayer, BelowLayer, Layer, LayerError, LayerName, LayerStatus, Message, Nexus,
    ProviderInfo, TransportLayer,
};
use std::sync::{Arc, Mutex, Weak};
use uuid::Uuid;

/// Top-of-stack recorder standing in for a role layer.
#[derive(Default)]
struct RecordingAbove {
    announced: Mutex<Vec<Arc<dyn Nexus>>>,
    revoked: Mutex<Vec<Uuid>>,
    messages: Mutex<Vec<Message>>,
}

impl AboveLayer for RecordingAbove {
    fn announce_nexus(&self, below_nexus: Arc<dyn Nexus>) {
        self.announced.lock().unwrap().push(below_nexus);
    }

    fn revoke_nexus(&self, below_nexus: Arc<dyn Nexus>) {
        self.revoked.lock().unwrap().push(below_nexus.uuid());
    }

    fn on_message(&self, _below_nexus: Arc<dyn Nexus>, msg: Message) {
        self.messages.lock().unwrap().push(msg);
    }
}

struct TestStack {
    transport: Arc<LoopbackTransport>,
    rendezvous: Arc<RendezvousLayer>,
    consumer: Arc<ConsumerLayer>,
    transact: Arc<TransactLayer>,
    top: Arc<RecordingAbove>,
}

fn build(transport: Arc<LoopbackTransport>) -> TestStack {
    let rendezvous = RendezvousLayer::new();
    rendezvous.register_above_layer(transport.clone());
    let consumer = ConsumerLayer::new();
    consumer.register_above_layer(rendezvous.clone());
    let transact = TransactLayer::with_max_pending(2);
    transact.register_above_layer(consumer.clone());

    let top = Arc::new(RecordingAbove::default());
    let weak_top: Weak<dyn AboveLayer> = Arc::downgrade(&top) as Weak<dyn AboveLayer>;
    transact.set_above_layer(weak_top);

    TestStack {
        transport,
        rendezvous,
        consumer,
        transact,
        top,
    }
}

fn connected_stack() -> TestStack {
    let transport =
        LoopbackTransport::with_responder(provider_responder(test_provider_info(50_000)));
    let stack = build(transport);
    stack.transport.connect(&test_location(), &test_seed(7));
    stack.transport.pump();
    stack
}

fn transact_nexus(stack: &TestStack) -> Arc<TransactNexus> {
    stack.transact.nexuses().pop().expect("transact nexus")
}

#[test]
fn test_handshake_announces_through_every_layer() {
    let stack = connected_stack();

    let announced = stack.top.announced.lock().unwrap().clone();
    assert_eq!(announced.len(), 1);

    let layers: Vec<LayerName> = nexus_chain(announced[0].clone())
        .iter()
        .map(|n| n.layer_name())
        .collect();
    assert_eq!(
        layers,
        vec![
            LayerName::ConsumerTransact,
            LayerName::Consumer,
            LayerName::OutgoingRendezvous,
            LayerName::OutgoingWebsocket,
        ]
    );
    for nexus in nexus_chain(announced[0].clone()) {
        assert_eq!(nexus.shared_seed(), &test_seed(7));
    }
}

#[test]
fn test_handshake_message_order() {
    let stack = connected_stack();
    let names: Vec<&str> = stack
        .transport
        .sent_messages()
        .iter()
        .map(|m| m.name())
        .collect();
    assert_eq!(names, vec!["rendezvous_request", "request_provider"]);

    let rid = match &stack.transport.sent_messages()[0] {
        Message::RendezvousRequest { rid } => rid.clone(),
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(rid, test_seed(7).derive_rendezvous_id());
}

#[test]
fn test_registration_links_layers() {
    let stack = connected_stack();
    assert_eq!(
        stack.rendezvous.below_layer().unwrap().layer_name(),
        LayerName::OutgoingWebsocket
    );
    assert_eq!(
        stack.consumer.below_layer().unwrap().layer_name(),
        LayerName::OutgoingRendezvous
    );
    assert_eq!(
        stack.transact.below_layer().unwrap().layer_name(),
        LayerName::Consumer
    );
}

#[test]
fn test_second_registration_is_ignored() {
    let stack = connected_stack();
    let other = LoopbackTransport::new();
    stack.consumer.register_above_layer(other.clone());

    assert_eq!(
        stack.consumer.below_layer().unwrap().layer_name(),
        LayerName::OutgoingRendezvous
    );
}

#[test]
fn test_rendezvous_waits_until_end() {
    let transport = LoopbackTransport::new();
    let stack = build(transport);
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    stack
        .rendezvous
        .on_layer_event()
        .set(Arc::new(move |_: Option<&Arc<dyn Nexus>>, status: &LayerStatus| {
            sink.lock().unwrap().push(status.clone());
        }));

    stack.transport.connect(&test_location(), &test_seed(3));
    let rid = test_seed(3).derive_rendezvous_id();
    stack
        .transport
        .deliver(Message::RendezvousNotReady { rid: rid.clone() });
    // wrong id is ignored
    stack.transport.deliver(Message::RendezvousEnd {
        rid: "someone-else".into(),
    });
    assert!(stack.consumer.nexuses().is_empty());

    stack.transport.deliver(Message::RendezvousEnd { rid });
    assert_eq!(stack.consumer.nexuses().len(), 1);
    assert_eq!(
        *statuses.lock().unwrap(),
        vec![
            LayerStatus::NexusWaiting,
            LayerStatus::NexusWaiting,
            LayerStatus::NexusAnnounced
        ]
    );
}

#[test]
fn test_provider_info_and_ping() {
    let stack = connected_stack();
    let infos = Arc::new(Mutex::new(Vec::new()));
    let sink = infos.clone();
    stack
        .consumer
        .on_provider_info
        .set(Arc::new(move |_: &Arc<ConsumerNexus>, info: &ProviderInfo| {
            sink.lock().unwrap().push(info.clone());
        }));
    let pings = Arc::new(Mutex::new(0usize));
    let counter = pings.clone();
    stack
        .consumer
        .on_ping
        .set(Arc::new(move |_: &Arc<ConsumerNexus>, _msecs: u64| {
            *counter.lock().unwrap() += 1;
        }));

    let consumer_nexus = stack.consumer.nexuses().pop().unwrap();
    assert_eq!(consumer_nexus.provider_info().unwrap().msats, Some(50_000));

    consumer_nexus.send_ping().unwrap();
    assert_eq!(consumer_nexus.pending_pings(), 1);
    stack.transport.pump();
    assert_eq!(*pings.lock().unwrap(), 1);
    assert_eq!(consumer_nexus.pending_pings(), 0);

    // a later provider message is an update, not a second announce
    let update = test_provider_info(10);
    stack.transport.deliver(Message::Provider {
        request_reference_uuid: None,
        info: update.clone(),
    });
    assert_eq!(*infos.lock().unwrap(), vec![update]);
    assert_eq!(stack.top.announced.lock().unwrap().len(), 1);
}

#[test]
fn test_inbound_ping_is_answered() {
    let stack = connected_stack();
    let request_uuid = Uuid::new_v4();
    stack.transport.deliver(Message::Ping { request_uuid });

    assert_eq!(
        stack.transport.sent_messages().last(),
        Some(&Message::Pong {
            request_reference_uuid: request_uuid
        })
    );
}

#[test]
fn test_invoice_and_preimage_correlate() {
    let stack = connected_stack();
    let invoices = Arc::new(Mutex::new(Vec::new()));
    let sink = invoices.clone();
    stack.transact.on_invoice.set(Arc::new(
        move |_: &Arc<TransactNexus>, bolt11: &str, reference: Uuid| {
            sink.lock().unwrap().push((bolt11.to_string(), reference));
        },
    ));
    let preimages = Arc::new(Mutex::new(Vec::new()));
    let sink = preimages.clone();
    stack.transact.on_preimage.set(Arc::new(
        move |_: &Arc<TransactNexus>, preimage: &str, reference: Uuid| {
            sink.lock().unwrap().push((preimage.to_string(), reference));
        },
    ));

    let nexus = transact_nexus(&stack);
    let invoice_ref = nexus
        .request_invoice(2_000, Some("coffee".into()))
        .unwrap();
    let pay_ref = nexus.request_pay("lnbc1fake").unwrap();
    assert!(nexus.is_pending(&invoice_ref));
    stack.transport.pump();

    let invoices = invoices.lock().unwrap().clone();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].1, invoice_ref);
    assert!(invoices[0].0.starts_with("lnbc2n1test"));

    let preimages = preimages.lock().unwrap().clone();
    assert_eq!(preimages.len(), 1);
    assert_eq!(preimages[0].1, pay_ref);
    assert_eq!(nexus.pending_count(), 0);
}

#[test]
fn test_unmatched_invoice_is_dropped() {
    let stack = connected_stack();
    let fired = Arc::new(Mutex::new(false));
    let flag = fired.clone();
    stack.transact.on_invoice.set(Arc::new(
        move |_: &Arc<TransactNexus>, _: &str, _: Uuid| {
            *flag.lock().unwrap() = true;
        },
    ));

    stack.transport.deliver(Message::Invoice {
        request_reference_uuid: Uuid::new_v4(),
        bolt11: "lnbc1stray".into(),
    });
    assert!(!*fired.lock().unwrap());
    assert!(stack.top.messages.lock().unwrap().is_empty());
}

#[test]
fn test_pending_limit() {
    let transport = LoopbackTransport::with_responder(Arc::new(|msg: &Message| match msg {
        Message::RendezvousRequest { rid } => vec![Message::RendezvousEnd { rid: rid.clone() }],
        Message::RequestProvider { request_uuid } => vec![Message::Provider {
            request_reference_uuid: Some(*request_uuid),
            info: test_provider_info(1),
        }],
        _ => Vec::new(),
    }));
    let stack = build(transport);
    stack.transport.connect(&test_location(), &test_seed(5));
    stack.transport.pump();

    let nexus = transact_nexus(&stack);
    nexus.request_invoice(1, None).unwrap();
    nexus.request_invoice(2, None).unwrap();
    assert_eq!(
        nexus.request_invoice(3, None),
        Err(LayerError::TooManyPending { limit: 2 })
    );
    assert_eq!(stack.transport.sent_messages().len(), 4);
}

#[test]
fn test_app_messages_reach_the_top() {
    let stack = connected_stack();
    let payload = serde_json::json!({"type": "opinion", "item_id": "item-1"});
    stack.transport.deliver(Message::App {
        payload: payload.clone(),
    });
    assert_eq!(
        *stack.top.messages.lock().unwrap(),
        vec![Message::App { payload }]
    );
}

#[test]
fn test_close_all_revokes_upward_once() {
    let stack = connected_stack();
    let announced_uuid = stack.top.announced.lock().unwrap()[0].uuid();

    stack.transport.initiate_close_all();
    stack.transport.initiate_close_all();

    assert_eq!(*stack.top.revoked.lock().unwrap(), vec![announced_uuid]);
    assert!(stack.rendezvous.nexuses().is_empty());
    assert!(stack.consumer.nexuses().is_empty());
    assert!(stack.transact.nexuses().is_empty());
}

#[test]
fn test_send_after_close_fails() {
    let stack = connected_stack();
    let nexus = transact_nexus(&stack);
    stack.transport.initiate_close_all();

    assert_eq!(
        nexus.request_invoice(1_000, None),
        Err(LayerError::NexusClosed)
    );
    assert_eq!(nexus.pending_count(), 0);
}

fn record_statuses(layer: &dyn Layer) -> Arc<Mutex<Vec<LayerStatus>>> {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    layer
        .on_layer_event()
        .set(Arc::new(move |_: Option<&Arc<dyn Nexus>>, status: &LayerStatus| {
            sink.lock().unwrap().push(status.clone());
        }));
    statuses
}

#[test]
fn test_relay_error_during_rendezvous_is_reported() {
    let stack = build(LoopbackTransport::new());
    let statuses = record_statuses(&*stack.rendezvous);

    stack.transport.connect(&test_location(), &test_seed(9));
    stack.transport.deliver(Message::Error {
        code: "rendezvous_busy".into(),
        message: "id already paired".into(),
    });

    let statuses = statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0], LayerStatus::NexusWaiting);
    assert!(statuses[1].is_failure());
    match &statuses[1] {
        LayerStatus::Errored { reason } => {
            assert!(reason.contains("rendezvous_busy"));
            assert!(reason.contains("id already paired"));
        }
        other => panic!("expected a failure, got {:?}", other),
    }
    assert!(stack.consumer.nexuses().is_empty());
}

#[test]
fn test_provider_error_is_reported_not_forwarded() {
    let stack = connected_stack();
    let statuses = record_statuses(&*stack.consumer);

    stack.transport.deliver(Message::Error {
        code: "provider_down".into(),
        message: "wallet offline".into(),
    });

    let statuses = statuses.lock().unwrap().clone();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].is_failure());
    assert!(format!("{:?}", statuses[0]).contains("provider_down"));
    assert!(stack.top.messages.lock().unwrap().is_empty());
    assert_eq!(stack.top.revoked.lock().unwrap().len(), 0);
}

#[test]
fn test_invoices_for_sample_amounts() {
    let stack = connected_stack();
    let invoices = Arc::new(Mutex::new(Vec::new()));
    let sink = invoices.clone();
    stack.transact.on_invoice.set(Arc::new(
        move |_: &Arc<TransactNexus>, bolt11: &str, _: Uuid| {
            sink.lock().unwrap().push(bolt11.to_string());
        },
    ));

    let nexus = transact_nexus(&stack);
    for index in 0..TestFixtures::SAMPLE_MSATS.len() {
        nexus
            .request_invoice(TestFixtures::sample_msats(index), None)
            .unwrap();
        stack.transport.pump();
    }

    let invoices = invoices.lock().unwrap().clone();
    assert_eq!(invoices.len(), TestFixtures::SAMPLE_MSATS.len());
    for (bolt11, msats) in invoices.iter().zip(TestFixtures::SAMPLE_MSATS) {
        assert!(bolt11.starts_with(&format!("lnbc{}n1test", msats / 1000)));
    }
    assert_eq!(nexus.pending_count(), 0);
}

#[test]
fn test_transport_failure_cancels_request() {
    let stack = connected_stack();
    let nexus = transact_nexus(&stack);
    let wire = stack.transport.latest_open().unwrap();
    wire.fail_sends(Some("connection reset".into()));

    assert_eq!(
        nexus.request_pay("lnbc1fake"),
        Err(LayerError::Transport("connection reset".into()))
    );
    assert_eq!(nexus.pending_count(), 0);

    wire.fail_sends(None);
    assert!(nexus.request_pay("lnbc1fake").is_ok());
}
