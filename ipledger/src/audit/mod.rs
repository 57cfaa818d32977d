//! Audit event pipeline
//!
//! Business services describe *who did what to which entity* as an
//! [`AuditEvent`](event::AuditEvent) and hand it to the
//! [`AuditPublisher`](publisher::AuditPublisher), which blocks only on the
//! enqueue. [`AuditPersister`](persister::AuditPersister) workers drain the
//! queue, validate each delivery, and append it to an append-only store whose
//! immutability is enforced by database triggers. The query module serves the
//! persisted log read-only, rendering raw rows into the human-readable shape
//! the admin UI consumes.
//!
//! Delivery is at-least-once: an unacked message reappears after a visibility
//! timeout, and a crash between insert and ack can duplicate a row. Events
//! carry their own before/after snapshots, so duplicates never corrupt
//! derived details — they only repeat them.

pub mod action;
pub mod event;
pub mod persister;
pub mod publisher;
pub mod query;
pub mod queue;
pub mod store;

pub use action::{ActionKind, UnknownActionKind};
pub use event::{ActorRef, AuditEvent, RequestContext};
pub use persister::AuditPersister;
pub use publisher::AuditPublisher;
