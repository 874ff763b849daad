//! # OctoFHIR Conformance
//!
//! Must-support conformance assessment for FHIR Implementation Guides.
//!
//! ## Features
//!
//! - **Metadata extraction**: Derive must-support elements, extensions and slices from profile snapshots
//! - **Assessment**: Report which must-support items a set of resources never populates
//! - **Path navigation**: FHIRPath-like traversal with choice types, primitive extensions and named slices
//! - **Validation**: Drive an external FHIR validator service and filter its noise
//! - **IG packages**: Load profiles, value sets and examples from `package.tgz`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use octofhir_conformance::*;
//!
//! # fn example(resources: Vec<serde_json::Value>) -> Result<()> {
//! let ig = IgPackage::from_path("package.tgz")?;
//! let assessment = MustSupportAssessment::new(&ig);
//! let metadata = assessment.metadata_for_url("http://hl7.org/fhir/us/core/StructureDefinition/us-core-patient")?;
//!
//! let report = assess(&resources, &metadata);
//! for missing in report.to_strings() {
//!     println!("missing: {missing}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod config;
pub mod error;
pub mod metadata_extractor;
pub mod must_support;
pub mod node;
pub mod package;
pub mod path_resolver;
pub mod slicing;
pub mod terminology;
pub mod types;
pub mod validator;

pub use config::{ContextKey, ValidationContext, ValidatorConfig, ValidatorRegistry};
pub use error::Result;
pub use error::{ConformanceError, ValidatorErrorKind};
pub use metadata_extractor::{ExtractorOptions, MetadataExtractor, extract_metadata};
pub use must_support::{
    AssessmentOptions, MissingItemReport, MustSupportAssessment, MustSupportAssessor, assess,
};
pub use node::{DATA_ABSENT_REASON_URL, Node};
pub use package::{IgPackage, PackageManifest};
pub use path_resolver::PathResolver;
pub use terminology::ValueExtractor;
pub use types::*;
pub use validator::{FhirResourceValidator, FhirResourceValidatorBuilder};
