//! Field mapping: synonym tables, custom rules, and the resolution engine.

mod engine;
mod rules;

pub use engine::{
    numeric_value, FieldMapper, FieldMapping, MapMethod, MapperConfig, TableMapping,
};
pub use rules::{
    builtin_target, canonical_field_type, is_canonical, known_source_names, normalize,
    required_fields, FieldType, MappingRule,
};
