//! Data source descriptors, resolution and schema introspection.

pub mod descriptor;
pub mod introspect;
pub mod resolver;
pub mod store;

pub use descriptor::{
    ColumnSchema, DataSourceDescriptor, SchemaMap, SourceKind, SourceStatus, TableHandle,
    file_table_name,
};
pub use introspect::SchemaIntrospector;
pub use resolver::{
    DataSourceResolver, InactiveReason, ResolveOutcome, ResolvedData, SourceBinding,
};
pub use store::DataSourceStore;
