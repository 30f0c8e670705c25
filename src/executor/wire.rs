//! # Process worker protocol.
//!
//! Parent and child exchange newline-delimited JSON over the child's stdio:
//!
//! ```text
//! child  → parent   {"pid":4242,"error":null}                     once, when ready
//! parent → child    {"id":"…","payload":<P>}                      one per task
//! child  → parent   {"id":"…","result":{"Ok":<O>}}                stored result
//!                   {"id":"…","result":null}                      nothing to store
//!                   {"id":"…","result":{"Err":{"Failed":{…}}}}    error, child exits
//! ```
//!
//! Replies come back strictly in request order; a reply whose id does not
//! match the request in flight is a protocol violation.

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::tasks::TaskId;

/// First line a child writes: ready, or failed to start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Child process id.
    pub pid: u32,
    /// Set when the routine's `on_start` failed; the child exits right after.
    #[serde(default)]
    pub error: Option<TaskError>,
}

/// One task sent to a child.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request<T> {
    /// Task identity, echoed back in the reply.
    pub id: TaskId,
    /// Task payload.
    pub payload: T,
}

/// A child's answer to one [`Request`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reply<T> {
    /// Identity of the request being answered.
    pub id: TaskId,
    /// `None` when the routine produced nothing for this task.
    pub result: Option<Result<T, TaskError>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_error_defaults_to_none() {
        let hs: Handshake = serde_json::from_str(r#"{"pid":12}"#).unwrap();
        assert_eq!(hs, Handshake { pid: 12, error: None });
    }

    #[test]
    fn reply_shapes_are_distinguishable() {
        let id = TaskId::new();
        let nothing: Reply<u32> = serde_json::from_str(&format!(r#"{{"id":"{}","result":null}}"#, uuid_of(id))).unwrap();
        assert!(nothing.result.is_none());

        let failed = Reply::<u32> {
            id,
            result: Some(Err(TaskError::failed("bad input"))),
        };
        let back: Reply<u32> = serde_json::from_str(&serde_json::to_string(&failed).unwrap()).unwrap();
        assert_eq!(back.id, id);
        assert_eq!(back.result, Some(Err(TaskError::failed("bad input"))));
    }

    fn uuid_of(id: TaskId) -> String {
        serde_json::to_value(id).unwrap().as_str().unwrap().to_string()
    }
}
