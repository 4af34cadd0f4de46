use moneysocket_buyer::{BuyerMessage, CatalogItem, SellerInfo, StackConfig};
use moneysocket_core::{LocationKind, Message};
use serde_json::json;
use uuid::Uuid;

#[test]
fn test_seller_info_wire_shape() {
    let seller_uuid = Uuid::new_v4();
    let msg = BuyerMessage::SellerInfo {
        request_reference_uuid: None,
        info: SellerInfo {
            seller_uuid,
            items: vec![CatalogItem {
                item_id: "item-42".to_string(),
                label: "Meaning of life".to_string(),
                msats: 42_000,
            }],
        },
    };

    let encoded = Message::decode(&msg.to_message().unwrap().encode().unwrap()).unwrap();
    let value = serde_json::to_value(&encoded).unwrap();

    // Outer envelope uses tag="type", content="payload"; buyer messages are tagged inline
    assert_eq!(value["type"], "app");
    assert_eq!(value["payload"]["payload"]["type"], "seller_info");
    assert_eq!(
        value["payload"]["payload"]["info"]["seller_uuid"],
        seller_uuid.to_string()
    );
    assert_eq!(
        value["payload"]["payload"]["info"]["items"][0]["msats"],
        42_000
    );
    assert!(value["payload"]["payload"]
        .get("request_reference_uuid")
        .is_none());

    assert_eq!(BuyerMessage::from_message(&encoded).unwrap(), Some(msg));
}

#[test]
fn test_opinion_invoice_from_json() {
    let reference = Uuid::new_v4();
    let raw = json!({
        "type": "app",
        "payload": {
            "payload": {
                "type": "opinion_invoice",
                "request_reference_uuid": reference,
                "bolt11": "lnbc42n1test"
            }
        }
    });

    let msg = Message::decode(raw.to_string().as_bytes()).unwrap();
    match BuyerMessage::from_message(&msg).unwrap() {
        Some(BuyerMessage::OpinionInvoice {
            request_reference_uuid,
            bolt11,
        }) => {
            assert_eq!(request_reference_uuid, reference);
            assert_eq!(bolt11, "lnbc42n1test");
        }
        other => panic!("Wrong variant decoded: {:?}", other),
    }
}

#[test]
fn test_stack_config_serialization() {
    let config = StackConfig::default()
        .with_location_kinds(vec![LocationKind::WebSocket, LocationKind::WebRtc]);

    let value = serde_json::to_value(&config).unwrap();
    assert_eq!(
        value["supported_location_kinds"],
        json!(["websocket", "webrtc"])
    );
    assert_eq!(value["max_pending_requests"], 64);
    assert_eq!(value["request_timeout_secs"], 60);

    let parsed = StackConfig::from_json(&value.to_string()).unwrap();
    assert_eq!(parsed, config);
}
