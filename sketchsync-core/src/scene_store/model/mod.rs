/*
    Model subsystem - Scene element records
*/

pub mod element;
pub mod types;

pub use element::{
    Element, FieldValue, Payload, BOUND_ELEMENTS, CONTAINER_ID, GROUP_IDS, RESERVED_FIELDS,
};
pub use types::{ElementId, ElementKind, Timestamp};
