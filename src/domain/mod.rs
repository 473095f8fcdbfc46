pub mod entities;
pub mod naming;

pub use entities::{
    Capability, Context, ContextProperties, ExtendedLocation, Hierarchy, ProvisioningState,
    Resource, ReviewRequest, Schema, SchemaProperties, SchemaVersion, SchemaVersionProperties,
    SolutionTemplate, SolutionTemplateProperties, SolutionTemplateVersion,
    SolutionTemplateVersionProperties, SolutionTemplateVersionRequest, SolutionVersion,
    SolutionVersionParameter, SolutionVersionProperties, Target, TargetProperties,
};
pub use naming::{
    FileVersionSource, FixedNameGenerator, NameGenerator, RandomNameGenerator, SemanticVersion,
    SequenceVersionSource, VersionSource,
};
