//! # Assignment Orchestration
//!
//! [`AssignmentEngine`] decides, for every new or freed-up ticket, which agent
//! handles it next. Its behaviour is split across files, each adding an
//! `impl AssignmentEngine` block:
//!
//! - [`core`]: construction, configuration, event emission, admin pass-throughs
//! - [`selector`]: least-loaded candidate selection with random tie-break
//! - [`slots`]: the atomic assign and release transitions
//! - [`queue`]: enqueue, priority-then-age drain, queue listing
//! - [`bulk`]: pulling holding tickets when an agent comes online
//! - [`reassign`]: supervisor transfers between agents
//! - [`intake`]: collaborator entry points (inbound messages, status and presence changes)
//!
//! ## Example
//!
//! ```rust,no_run
//! use deskroute_assignment_engine::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> deskroute_assignment_engine::Result<()> {
//! let db = DatabaseManager::new_in_memory().await?;
//! let engine = AssignmentEngine::with_database(db, EngineConfig::default(), Arc::new(NullPublisher));
//!
//! engine.create_tenant(&"acme".into(), "Acme").await?;
//! engine
//!     .upsert_agent(&AgentProfile::new("alice", "acme", "Alice", vec![ChannelType::Whatsapp], 2))
//!     .await?;
//! engine.update_agent_presence(&"alice".into(), AgentStatus::Online).await?;
//!
//! let outcome = engine
//!     .create_ticket(NewTicket {
//!         tenant_id: "acme".into(),
//!         channel_type: ChannelType::Whatsapp,
//!         contact_external_id: "+15550100".to_string(),
//!         contact_name: Some("Dana".to_string()),
//!         priority: Priority::High,
//!     })
//!     .await?;
//! println!("🎯 {:?}", outcome.routing);
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod core;
pub mod intake;
pub mod queue;
pub mod reassign;
pub mod selector;
pub mod slots;
pub mod types;

pub use self::core::AssignmentEngine;
pub use types::{
    Assignment, BulkAssignReason, BulkAssignResult, InboundOutcome, PresenceUpdate, ReassignOutcome,
    ReleaseOutcome, RoutingOutcome, StatusUpdate,
};
