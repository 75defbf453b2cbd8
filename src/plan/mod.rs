//! Plan generators and the shared document/persistence layer they write to
//! (spec §4.7/§4.8/§6): Consolidator, Duplicates, Audit, Compliance.

pub mod audit;
pub mod compliance;
pub mod consolidator;
pub mod documents;
pub mod duplicates;
pub mod executor;

pub use documents::{
    AuditAction, AuditActionKind, AuditItem, AuditPlan, AuditSummary, ComplianceAction,
    ComplianceClass, CompliancePlan, ComplianceSummary, ConsolidateAction, ConsolidateGroup,
    ConsolidateOperation, ConsolidatePlan, ConsolidateSummary, DuplicateItem, DuplicatePlan,
    DuplicateSummary, FileRef, PlanState, PlanStore, clean_path, is_contained_in,
};
pub use executor::{
    execute_audit, execute_compliance, execute_consolidate, execute_duplicates, ExecutionReport,
    AUDIT_EXECUTION_CONFIDENCE_GATE,
};
