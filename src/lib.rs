//! # fabric-channel-client
//!
//! Channel client for a Hyperledger Fabric style ledger network.
//!
//! A chaincode call is endorsed by a set of peers, their simulation results
//! are reconciled into one transaction, and for `execute` calls the
//! transaction is sent for ordering while the client waits, with a deadline,
//! for its commit status.
//!
//! ## Architecture
//!
//! - **Execution pipeline** ([`handler`]): composable stages for peer
//!   selection, endorsement, query results and commit confirmation
//! - **Event dispatcher** ([`events`]): one task owning every block,
//!   filtered-block, chaincode and tx-status subscription
//! - **Collaborators** ([`fab`]): transport, signing, discovery and
//!   selection are supplied by the caller through traits
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fabric_channel_client::events::spawn_dispatcher_default;
//! use fabric_channel_client::{ChannelClient, ClientContext, Opts, Request};
//!
//! #[tokio::main]
//! async fn main() -> fabric_channel_client::Result<()> {
//!     let (events, _dispatcher) = spawn_dispatcher_default();
//!     let ctx = ClientContext::new("mychannel", discovery, selection, transactor, Arc::new(events));
//!     let client = ChannelClient::new(ctx);
//!
//!     let response = client
//!         .execute(Request::new("mycc", "move").args(["a", "b", "10"]), Opts::new())
//!         .await?;
//!     println!("committed {}", response.transaction_id);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod events;
pub mod fab;
pub mod handler;

mod client;

pub use client::{ChannelClient, ChannelClientBuilder};
pub use error::{ChannelError, Result};
pub use handler::{ClientContext, Opts, Request, RequestContext, Response};
