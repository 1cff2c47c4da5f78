//! Entity-type and property descriptors.
//!
//! These are the opaque handles the engine consumes from the external
//! metadata layer: which table an entity maps to and which column, scalar
//! type, and store type each declared property resolves to. The engine never
//! reflects over source-language types; it only reads these descriptors.

use serde::{Deserialize, Serialize};

use crate::types::{SqlType, TypeMapping};

/// Metadata about a declared property of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Property {
    /// Property name in the source model
    pub name: String,
    /// Database column name (may differ from the property name)
    pub column_name: String,
    /// SQL type for this property
    pub sql_type: SqlType,
    /// Dialect-specific store type, when the metadata layer resolved one
    pub type_mapping: Option<TypeMapping>,
    /// Whether the column is nullable
    pub nullable: bool,
}

impl Property {
    /// Create a new property with minimal required data.
    ///
    /// The column name defaults to the property name.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        let name = name.into();
        Self {
            column_name: name.clone(),
            name,
            sql_type,
            type_mapping: None,
            nullable: false,
        }
    }

    /// Set the database column name.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column_name = name.into();
        self
    }

    /// Set the dialect type mapping.
    pub fn type_mapping(mut self, mapping: TypeMapping) -> Self {
        self.type_mapping = Some(mapping);
        self
    }

    /// Set the nullable flag.
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }
}

/// Metadata about an entity type and the table it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityType {
    /// Entity name in the source model
    pub name: String,
    /// Mapped table name
    pub table_name: String,
    /// Optional schema the table lives in
    pub schema: Option<String>,
    properties: Vec<Property>,
}

impl EntityType {
    /// Create a new entity type mapped to the given table.
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            schema: None,
            properties: Vec::new(),
        }
    }

    /// Set the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Add a declared property.
    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// The declared properties, in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Look up a declared property by name.
    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_defaults_column_to_name() {
        let p = Property::new("Name", SqlType::Text);
        assert_eq!(p.column_name, "Name");
        assert!(!p.nullable);
    }

    #[test]
    fn test_property_builder_chain() {
        let p = Property::new("Title", SqlType::VarChar(100))
            .column("title")
            .type_mapping(TypeMapping::new("varchar(100)"))
            .nullable(true);
        assert_eq!(p.column_name, "title");
        assert!(p.nullable);
        assert_eq!(p.type_mapping.unwrap().store_type, "varchar(100)");
    }

    #[test]
    fn test_entity_property_lookup() {
        let entity = EntityType::new("Customer", "customers")
            .property(Property::new("Id", SqlType::BigInt))
            .property(Property::new("Name", SqlType::Text));

        assert_eq!(entity.properties().len(), 2);
        assert!(entity.find_property("Name").is_some());
        assert!(entity.find_property("Missing").is_none());
    }
}
