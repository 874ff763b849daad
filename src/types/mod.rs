//! Core type definitions for octofhir-conformance.
//!
//! - **[`structure_definition`]** - Profile and element definition types
//! - **[`value_set`]** - ValueSet / CodeSystem types for binding resolution
//! - **[`metadata`]** - Must-support metadata and slice discriminators
//! - **[`issue`]** - Validator issues
//! - **[`run`]** - Messages and test results

pub mod issue;
pub mod metadata;
pub mod run;
pub mod structure_definition;
pub mod value_set;

pub use issue::{IssueSeverity, OutcomeIssue, ValidatorIssue};
pub use metadata::{
    BoundCoding, ChoiceElement, ChoiceGroup, Discriminator, DiscriminatorValue,
    MustSupportElement, MustSupportExtension, MustSupportMetadata, MustSupportSlice,
    display_value,
};
pub use run::{Message, MessageType, ResultKind, RunContext, TestResult};
pub use structure_definition::{
    BASE_DEFINITION_PREFIX, ElementBinding, ElementDefinition, ElementList, ElementSlicing,
    ElementType, Extension, PrimitiveExtensions, SlicingDiscriminator, StructureDefinition,
    TYPE_MUST_SUPPORT_EXTENSION_URL,
};
pub use value_set::{
    CodeSystem, CodeSystemConcept, ValueSet, ValueSetCompose, ValueSetConcept,
    ValueSetExpansion, ValueSetExpansionContains, ValueSetFilter, ValueSetInclude,
};
