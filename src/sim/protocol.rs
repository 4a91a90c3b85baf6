//! Wire format between the engine and the simulation worker.
//!
//! Every message is a JSON object tagged by `type` and wrapped in an
//! [`Envelope`] carrying the run epoch:
//!
//! ```json
//! {"epoch": 3, "type": "reheat", "alpha": 0.5}
//! ```
//!
//! Only ids and numbers cross the boundary.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::config::ConfigPatch;
use super::{SimulationState, SimulationStatus};
use crate::model::NodeId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub epoch: u64,
    #[serde(flatten)]
    pub message: T,
}

impl<T: Serialize + DeserializeOwned> Envelope<T> {
    pub fn new(epoch: u64, message: T) -> Self {
        Self { epoch, message }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Node state sent in `init` and `update`. Absent fields are left alone;
/// `fx`/`fy` pin the node and `unpin` releases it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInput {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unpin: bool,
}

impl NodeInput {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn pinned(mut self, x: f32, y: f32) -> Self {
        self.fx = Some(x);
        self.fy = Some(y);
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = Some(radius);
        self
    }

    pub fn unpinned(mut self) -> Self {
        self.unpin = true;
        self
    }

    pub(super) fn position(&self) -> Option<(f32, f32)> {
        Some((self.x?, self.y?))
    }

    pub(super) fn pin(&self) -> Option<(f32, f32)> {
        Some((self.fx?, self.fy?))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: NodeId,
    pub target: NodeId,
}

impl LinkInput {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

/// Engine → worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    Init {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nodes: Option<Vec<NodeInput>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        edges: Option<Vec<LinkInput>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<ConfigPatch>,
    },
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nodes: Option<Vec<NodeInput>>,
    },
    Tick,
    Pause,
    Resume,
    Stop,
    Configure {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<ConfigPatch>,
    },
    Reheat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alpha: Option<f32>,
    },
}

impl Inbound {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Update { .. } => "update",
            Self::Tick => "tick",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Configure { .. } => "configure",
            Self::Reheat { .. } => "reheat",
        }
    }
}

/// Worker → engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    /// Initial positions right after `init`.
    Ready {
        nodes: Vec<NodePosition>,
        state: SimulationState,
    },
    /// Throttled position batch.
    Tick {
        nodes: Vec<NodePosition>,
        state: SimulationState,
    },
    /// Alpha dropped below `alphaMin`; final positions.
    End {
        nodes: Vec<NodePosition>,
        state: SimulationState,
    },
    State {
        state: SimulationState,
    },
    Error {
        error: String,
        state: SimulationState,
    },
}

impl Outbound {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Tick { .. } => "tick",
            Self::End { .. } => "end",
            Self::State { .. } => "state",
            Self::Error { .. } => "error",
        }
    }

    pub fn state(&self) -> &SimulationState {
        match self {
            Self::Ready { state, .. }
            | Self::Tick { state, .. }
            | Self::End { state, .. }
            | Self::State { state }
            | Self::Error { state, .. } => state,
        }
    }

    /// Position batch carried by the message, if any.
    pub fn positions(&self) -> Option<&[NodePosition]> {
        match self {
            Self::Ready { nodes, .. } | Self::Tick { nodes, .. } | Self::End { nodes, .. } => {
                Some(nodes)
            }
            Self::State { .. } | Self::Error { .. } => None,
        }
    }

    pub fn status(&self) -> SimulationStatus {
        self.state().status
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn inbound_envelope_is_flat_and_tagged() {
        let envelope = Envelope::new(
            4,
            Inbound::Reheat { alpha: Some(0.5) },
        );
        let value = serde_json::to_value(&envelope).expect("serializable");
        assert_eq!(value, json!({"epoch": 4, "type": "reheat", "alpha": 0.5}));

        let bare = Envelope::<Inbound>::from_json(r#"{"epoch":1,"type":"reheat"}"#)
            .expect("alpha is optional");
        assert_eq!(bare.message, Inbound::Reheat { alpha: None });
    }

    #[test]
    fn init_parses_nodes_edges_and_camel_case_config() {
        let raw = r#"{
            "epoch": 2,
            "type": "init",
            "nodes": [{"id": "a", "x": 1, "y": 2}, {"id": "b", "fx": 5, "fy": 6}],
            "edges": [{"source": "a", "target": "b"}],
            "config": {"linkDistance": 100, "broadcastEvery": 5}
        }"#;
        let envelope = Envelope::<Inbound>::from_json(raw).expect("valid init");
        assert_eq!(envelope.epoch, 2);
        let Inbound::Init {
            nodes: Some(nodes),
            edges: Some(edges),
            config: Some(config),
        } = envelope.message
        else {
            panic!("expected a complete init");
        };
        assert_eq!(nodes[0].position(), Some((1.0, 2.0)));
        assert_eq!(nodes[1].pin(), Some((5.0, 6.0)));
        assert_eq!(edges, vec![LinkInput::new("a", "b")]);
        assert_eq!(config.link_distance, Some(100.0));
        assert_eq!(config.broadcast_every, Some(5));
    }

    #[test]
    fn init_without_nodes_still_parses() {
        let envelope = Envelope::<Inbound>::from_json(r#"{"epoch":1,"type":"init","edges":[]}"#)
            .expect("validation happens in the simulation");
        assert!(matches!(
            envelope.message,
            Inbound::Init { nodes: None, edges: Some(_), .. }
        ));
    }

    #[test]
    fn outbound_state_uses_camel_case() {
        let message = Outbound::State {
            state: SimulationState {
                alpha: 0.25,
                is_running: false,
                iterations: 12,
                status: SimulationStatus::Paused,
            },
        };
        let value = serde_json::to_value(Envelope::new(7, message)).expect("serializable");
        assert_eq!(
            value,
            json!({
                "epoch": 7,
                "type": "state",
                "state": {"alpha": 0.25, "isRunning": false, "iterations": 12, "status": "paused"}
            })
        );
    }

    #[test]
    fn unit_messages_round_trip() {
        for message in [Inbound::Tick, Inbound::Pause, Inbound::Resume, Inbound::Stop] {
            let raw = Envelope::new(9, message.clone()).to_json().expect("serializable");
            assert!(raw.contains(&format!("\"type\":\"{}\"", message.kind())));
            let parsed = Envelope::<Inbound>::from_json(&raw).expect("parses back");
            assert_eq!(parsed.message, message);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(Envelope::<Inbound>::from_json(r#"{"epoch":1,"type":"explode"}"#).is_err());
    }
}
