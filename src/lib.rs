//! Tether Gateway - device trust and proximity for personal device meshes
//!
//! A user's devices pair with the gateway over a challenge/response flow,
//! hold bearer sessions, and keep each other informed in real time:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Devices                          │
//! │   Phone   │   Laptop   │   Watch   │   Tablet       │
//! └────────────────────┬────────────────────────────────┘
//!                      │  register / challenge / verify
//! ┌────────────────────▼────────────────────────────────┐
//! │                Tether Gateway                        │
//! │  Registry │ Challenges │ Sessions │ Proximity │ Hub  │
//! └────────────────────┬────────────────────────────────┘
//!                      │  auth events over WebSocket
//!              user:<id> / device:<id> channels
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod hub;
pub mod proximity;
pub mod registry;

pub use auth::{ChallengeManager, SessionContext, SessionIssuer};
pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use hub::{AuthEvent, AuthEventKind, ConnectionHub};
pub use proximity::{classify, Proximity, ProximityEngine};
pub use registry::{Device, DeviceRegistry, TrustState};
