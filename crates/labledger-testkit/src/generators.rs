//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Number, Value};

use labledger::ActionRecord;
use labledger_core::{EventHash, NewAuditEvent, Timestamp};

/// Generate a random EventHash.
pub fn event_hash() -> impl Strategy<Value = EventHash> {
    any::<[u8; 32]>().prop_map(EventHash::from_bytes)
}

/// Generate a timestamp between 1970 and roughly 2100.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    (0i64..=4_102_444_800_000_000).prop_map(Timestamp::from_micros)
}

/// Generate a user or entity id.
pub fn id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}".prop_map(String::from)
}

/// Generate a dotted event type such as `entry.created`.
pub fn event_type() -> impl Strategy<Value = String> {
    "[a-z]{1,10}\\.[a-z_]{1,12}".prop_map(String::from)
}

/// Generate an entity type.
pub fn entity_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("experiment".to_string()),
        Just("entry".to_string()),
        Just("user".to_string()),
        Just("attachment".to_string()),
    ]
}

/// Generate a finite JSON number, integral or not.
pub fn json_number() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        (-1.0e12f64..1.0e12).prop_filter_map("finite", |f| Number::from_f64(f).map(Value::Number)),
    ]
}

/// Generate an arbitrary JSON value up to a small depth.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        json_number(),
        "\\PC{0,12}".prop_map(Value::String),
    ];

    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("\\PC{0,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Generate a JSON object payload.
pub fn payload() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-zA-Z_]{1,8}", json_value(), 0..6)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

/// Generate an audit event request.
pub fn new_audit_event() -> impl Strategy<Value = NewAuditEvent> {
    (
        event_type(),
        entity_type(),
        proptest::option::of(id()),
        proptest::option::of(id()),
        payload(),
    )
        .prop_map(|(event_type, entity_type, actor, entity_id, payload)| {
            let mut event = NewAuditEvent::new(event_type, entity_type).payload(payload);
            event.actor_id = actor;
            event.entity_id = entity_id;
            event
        })
}

/// Parameters for generating an action with a few fixed owners, so
/// generated batches share pull audiences.
#[derive(Debug, Clone)]
pub struct ActionParams {
    pub owner: String,
    pub actor: Option<String>,
    pub device: Option<String>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub payload: Value,
}

impl Arbitrary for ActionParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        let user = || prop_oneof![Just("u1".to_string()), Just("u2".to_string()), Just("u3".to_string())];
        (
            user(),
            proptest::option::of(user()),
            proptest::option::of("dev-[0-9]".prop_map(String::from)),
            event_type(),
            entity_type(),
            proptest::option::of(id()),
            payload(),
        )
            .prop_map(
                |(owner, actor, device, event_type, entity_type, entity_id, payload)| ActionParams {
                    owner,
                    actor,
                    device,
                    event_type,
                    entity_type,
                    entity_id,
                    payload,
                },
            )
            .boxed()
    }
}

/// Build an action record from parameters.
pub fn action_from_params(params: &ActionParams) -> ActionRecord {
    let mut action = ActionRecord::new(
        params.owner.clone(),
        params.event_type.clone(),
        params.entity_type.clone(),
    )
    .payload(params.payload.clone());
    action.actor_user_id = params.actor.clone();
    action.device_id = params.device.clone();
    action.entity_id = params.entity_id.clone();
    action
}
