//! Two-stage privacy gate: a staged redaction pipeline that rewrites or
//! rejects text before it may enter a shared store, and an auditor that
//! classifies residual leaks by severity and keeps an append-only trail.

pub mod audit_log;
pub mod auditor;
pub mod keywords;
pub mod patterns;
pub mod sanitizer;

mod error;

pub use audit_log::AuditLog;
pub use auditor::{
	Action, AuditFinding, AuditReport, PatternValidation, PrivacyAuditor, Recommendation,
	Severity,
};
pub use error::{Error, Result};
pub use patterns::Redaction;
pub use sanitizer::{Decision, PatternSanitizer, SanitizationLevel, SanitizationResult};
