pub mod config;
pub mod memory;
pub mod message;
pub mod protocol;
pub mod scenario;

pub use config::{ClassicalChannelSpec, EncodingKind, QuantumChannelSpec, SimConfig};
pub use memory::{EntangledInfo, Memory, MemoryArray, MemoryRef, Observer};
pub use message::{Message, MessageBody, RESOURCE_MANAGER, ReqConditionFn, ResourceManagerMessage};
pub use protocol::{Protocol, ProtocolRef, RuleId, protocol_eq};
pub use scenario::{PhotonSourceSpec, Scenario, ScenarioAssertion, ScenarioError, SimConfigOverride};
