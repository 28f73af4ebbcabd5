pub mod audit_log;
pub mod event;
pub mod ticket;
pub mod user;

pub use audit_log::{AuditAction, AuditFilter, AuditLog, AuditLogView, NewAuditLog};
pub use event::{Event, EventDraft, EventStatus, NewEvent};
pub use ticket::{NewTicket, PurchaseRequest, Ticket, TicketStatus};
pub use user::{
    Actor, ClientInfo, NewUser, RegisterRequest, RequestContext, Role, User, UserProfile,
};
