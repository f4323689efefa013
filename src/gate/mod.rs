//! The authentication gate: path policy, session cookies and the OAuth
//! authorization-code flow.

pub mod cookies;
pub mod engine;
pub mod exchange;
pub mod flow;
pub mod policy;
pub mod request;
pub mod state;

pub use engine::{Collaborators, RequestGate};
pub use exchange::{CodeExchange, ExchangeError, HttpTokenEndpoint, TokenEndpoint, TokenSet};
pub use flow::{AuthFlow, ProviderUrls};
pub use policy::ProtectedPaths;
pub use request::{EdgeRequest, EdgeResponse, GateDecision};
