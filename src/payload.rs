use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use thiserror::Error;

/// The only reference that is allowed to trigger an update.
pub const MASTER_REF: &str = "refs/heads/master";

/// A custom error for describing why a payload cannot be used.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The request body could not be read until the end.
    #[error("cannot read payload: {0}")]
    Unreadable(#[from] std::io::Error),
    /// The body is not JSON at all.
    #[error("payload is not valid json: {0}")]
    NotJson(serde_json::Error),
    /// The body is JSON, but not an object.
    #[error("payload is not a json object")]
    NotAnObject,
    /// The body is a JSON object, but none of the known webhooks match it.
    /// The parameter is the error of the last decoder tried.
    #[error("payload does not match any known webhook: {0}")]
    Unrecognized(serde_json::Error),
}

/// A change list as sent by Bitbucket Server, stripped down to the bare minimum.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct RefChangeList {
    #[serde(rename = "refChanges")]
    pub ref_changes: Vec<RefChange>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct RefChange {
    #[serde(rename = "refId", default)]
    pub ref_id: String,
}

/// A push event as sent by GitLab, also just the bare minimum.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct SingleRef {
    #[serde(rename = "ref")]
    pub reference: String,
}

/// A webhook delivery, reduced to the references it changed.
///
/// Every variant is one webhook schema that we understand. New schemas
/// should be added here and in [DECODERS].
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    RefChangeList(RefChangeList),
    SingleRef(SingleRef),
}

impl WebhookEvent {
    /// The reference that changed, or `None` if the change is known not to touch master.
    ///
    /// Change lists are filtered to master here, single references are passed
    /// through verbatim and have to be filtered by the caller.
    pub fn changed_ref(&self) -> Option<&str> {
        match self {
            WebhookEvent::RefChangeList(list) => list
                .ref_changes
                .iter()
                .any(|change| change.ref_id == MASTER_REF)
                .then_some(MASTER_REF),
            WebhookEvent::SingleRef(single) => Some(single.reference.as_str()),
        }
    }

    /// Returns true if the event is a change on `refs/heads/master`.
    pub fn is_master(&self) -> bool {
        self.changed_ref() == Some(MASTER_REF)
    }

    /// A short name of the schema, used for logging.
    pub fn schema(&self) -> &'static str {
        match self {
            WebhookEvent::RefChangeList(_) => "ref-change-list",
            WebhookEvent::SingleRef(_) => "single-ref",
        }
    }
}

type Decoder = fn(&Value) -> Result<WebhookEvent, serde_json::Error>;

fn decode_ref_change_list(value: &Value) -> Result<WebhookEvent, serde_json::Error> {
    RefChangeList::deserialize(value).map(WebhookEvent::RefChangeList)
}

fn decode_single_ref(value: &Value) -> Result<WebhookEvent, serde_json::Error> {
    SingleRef::deserialize(value).map(WebhookEvent::SingleRef)
}

/// The known decoders in priority order, the first successful one wins.
const DECODERS: &[Decoder] = &[decode_ref_change_list, decode_single_ref];

/// Parse a complete payload into a [WebhookEvent].
pub fn normalize(data: &[u8]) -> Result<WebhookEvent, PayloadError> {
    let value: Value = serde_json::from_slice(data).map_err(PayloadError::NotJson)?;
    if !value.is_object() {
        return Err(PayloadError::NotAnObject);
    }

    let mut last_error = None;
    for decode in DECODERS {
        match decode(&value) {
            Ok(event) => return Ok(event),
            Err(err) => last_error = Some(err),
        }
    }

    match last_error {
        Some(err) => Err(PayloadError::Unrecognized(err)),
        None => Err(PayloadError::NotAnObject),
    }
}

/// Read the whole body first, then parse it with [normalize].
pub fn normalize_reader<R: Read>(mut reader: R) -> Result<WebhookEvent, PayloadError> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    normalize(&data)
}
