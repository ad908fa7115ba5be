//! Entity schema descriptors for convo-sync.
//!
//! The two synchronized kinds have a fixed shape. A store handle reports the
//! shape it actually provides as a [`StoreSchema`]; the engine checks it
//! against [`CONVERSATION_ENTITY`] and [`MESSAGE_ENTITY`] once, at
//! construction, and never again.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use sync_types::RecordKind;
use thiserror::Error;

/// How many records a relationship points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one related record.
    ToOne,
    /// Any number of related records.
    ToMany,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::ToOne => f.write_str("to-one"),
            Cardinality::ToMany => f.write_str("to-many"),
        }
    }
}

/// A required relationship on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipDescriptor {
    /// Relationship name.
    pub name: &'static str,
    /// Required cardinality.
    pub cardinality: Cardinality,
}

/// Static declaration of a synchronized entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// The record kind the entity stores.
    pub kind: RecordKind,
    /// Entity name used when none is configured.
    pub default_name: &'static str,
    /// Required attribute names.
    pub attributes: &'static [&'static str],
    /// Required relationships.
    pub relationships: &'static [RelationshipDescriptor],
}

impl EntityDescriptor {
    /// The entity schema a fully compatible store reports for this descriptor.
    pub fn to_entity_schema(&self, name: &str) -> EntitySchema {
        let mut entity = EntitySchema::new(name);
        for attribute in self.attributes {
            entity = entity.with_attribute(attribute);
        }
        for relationship in self.relationships {
            entity = entity.with_relationship(relationship.name, relationship.cardinality);
        }
        entity
    }
}

/// The conversation entity.
pub const CONVERSATION_ENTITY: EntityDescriptor = EntityDescriptor {
    kind: RecordKind::Conversation,
    default_name: "Conversation",
    attributes: &["identifier", "createdAt"],
    relationships: &[
        RelationshipDescriptor {
            name: "lastMessage",
            cardinality: Cardinality::ToOne,
        },
        RelationshipDescriptor {
            name: "messages",
            cardinality: Cardinality::ToMany,
        },
    ],
};

/// The message entity.
pub const MESSAGE_ENTITY: EntityDescriptor = EntityDescriptor {
    kind: RecordKind::Message,
    default_name: "Message",
    attributes: &[
        "identifier",
        "index",
        "isSent",
        "receivedAt",
        "sentAt",
        "sentByUserID",
    ],
    relationships: &[
        RelationshipDescriptor {
            name: "conversation",
            cardinality: Cardinality::ToOne,
        },
        RelationshipDescriptor {
            name: "lastMessageConversation",
            cardinality: Cardinality::ToOne,
        },
    ],
};

/// The shape of one entity as a store provides it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySchema {
    /// Entity name.
    pub name: String,
    /// Attribute names.
    pub attributes: BTreeSet<String>,
    /// Relationship names and cardinalities.
    pub relationships: BTreeMap<String, Cardinality>,
}

impl EntitySchema {
    /// An entity with no attributes or relationships.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: &str) -> Self {
        self.attributes.insert(name.to_string());
        self
    }

    /// Add a relationship.
    pub fn with_relationship(mut self, name: &str, cardinality: Cardinality) -> Self {
        self.relationships.insert(name.to_string(), cardinality);
        self
    }

    /// Drop an attribute (for building incompatible schemas).
    pub fn without_attribute(mut self, name: &str) -> Self {
        self.attributes.remove(name);
        self
    }

    /// Drop a relationship (for building incompatible schemas).
    pub fn without_relationship(mut self, name: &str) -> Self {
        self.relationships.remove(name);
        self
    }
}

/// The shapes of all entities a store provides, keyed by entity name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSchema {
    entities: BTreeMap<String, EntitySchema>,
}

impl StoreSchema {
    /// An empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema of a store that provides both entities under the given names.
    pub fn canonical(conversation_entity: &str, message_entity: &str) -> Self {
        Self::new()
            .with_entity(CONVERSATION_ENTITY.to_entity_schema(conversation_entity))
            .with_entity(MESSAGE_ENTITY.to_entity_schema(message_entity))
    }

    /// Add or replace an entity.
    pub fn with_entity(mut self, entity: EntitySchema) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Look up an entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    /// Names of all entities.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}

/// Ways a store schema can fail to satisfy a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The store has no entity with the configured name.
    #[error("entity {entity} not found in store schema")]
    MissingEntity {
        /// Configured entity name.
        entity: String,
    },

    /// A required attribute is absent.
    #[error("entity {entity} is missing attribute {attribute}")]
    MissingAttribute {
        /// Entity name.
        entity: String,
        /// Attribute name.
        attribute: &'static str,
    },

    /// A required relationship is absent.
    #[error("entity {entity} is missing relationship {relationship}")]
    MissingRelationship {
        /// Entity name.
        entity: String,
        /// Relationship name.
        relationship: &'static str,
    },

    /// A relationship exists with the wrong cardinality.
    #[error("relationship {entity}.{relationship} must be {expected}, store has {actual}")]
    CardinalityMismatch {
        /// Entity name.
        entity: String,
        /// Relationship name.
        relationship: &'static str,
        /// Required cardinality.
        expected: Cardinality,
        /// Cardinality the store provides.
        actual: Cardinality,
    },
}

/// Check that `schema` provides everything `descriptor` requires under `entity_name`.
///
/// Reports the first problem in declaration order.
pub fn validate(
    descriptor: &EntityDescriptor,
    entity_name: &str,
    schema: &StoreSchema,
) -> Result<(), SchemaError> {
    let entity = schema
        .entity(entity_name)
        .ok_or_else(|| SchemaError::MissingEntity {
            entity: entity_name.to_string(),
        })?;

    for &attribute in descriptor.attributes {
        if !entity.attributes.contains(attribute) {
            return Err(SchemaError::MissingAttribute {
                entity: entity_name.to_string(),
                attribute,
            });
        }
    }

    for relationship in descriptor.relationships {
        match entity.relationships.get(relationship.name) {
            None => {
                return Err(SchemaError::MissingRelationship {
                    entity: entity_name.to_string(),
                    relationship: relationship.name,
                })
            }
            Some(actual) if *actual != relationship.cardinality => {
                return Err(SchemaError::CardinalityMismatch {
                    entity: entity_name.to_string(),
                    relationship: relationship.name,
                    expected: relationship.cardinality,
                    actual: *actual,
                })
            }
            Some(_) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_schema_validates() {
        let schema = StoreSchema::canonical("Conversation", "Message");
        assert!(validate(&CONVERSATION_ENTITY, "Conversation", &schema).is_ok());
        assert!(validate(&MESSAGE_ENTITY, "Message", &schema).is_ok());
    }

    #[test]
    fn custom_entity_names_validate() {
        let schema = StoreSchema::canonical("Thread", "Post");
        assert!(validate(&CONVERSATION_ENTITY, "Thread", &schema).is_ok());
        assert!(validate(&MESSAGE_ENTITY, "Post", &schema).is_ok());
    }

    #[test]
    fn missing_entity_is_reported() {
        let schema = StoreSchema::canonical("Conversation", "Message");
        let err = validate(&MESSAGE_ENTITY, "Post", &schema).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingEntity {
                entity: "Post".into()
            }
        );
    }

    #[test]
    fn missing_attribute_is_reported() {
        let schema = StoreSchema::new().with_entity(
            MESSAGE_ENTITY
                .to_entity_schema("Message")
                .without_attribute("sentByUserID"),
        );
        let err = validate(&MESSAGE_ENTITY, "Message", &schema).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingAttribute {
                entity: "Message".into(),
                attribute: "sentByUserID",
            }
        );
    }

    #[test]
    fn missing_relationship_is_reported() {
        let schema = StoreSchema::new().with_entity(
            CONVERSATION_ENTITY
                .to_entity_schema("Conversation")
                .without_relationship("lastMessage"),
        );
        let err = validate(&CONVERSATION_ENTITY, "Conversation", &schema).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingRelationship {
                relationship: "lastMessage",
                ..
            }
        ));
    }

    #[test]
    fn wrong_cardinality_is_reported() {
        let schema = StoreSchema::new().with_entity(
            CONVERSATION_ENTITY
                .to_entity_schema("Conversation")
                .with_relationship("messages", Cardinality::ToOne),
        );
        let err = validate(&CONVERSATION_ENTITY, "Conversation", &schema).unwrap_err();
        assert_eq!(
            err.to_string(),
            "relationship Conversation.messages must be to-many, store has to-one"
        );
    }

    #[test]
    fn extra_fields_are_allowed() {
        let schema = StoreSchema::new().with_entity(
            CONVERSATION_ENTITY
                .to_entity_schema("Conversation")
                .with_attribute("title")
                .with_relationship("participants", Cardinality::ToMany),
        );
        assert!(validate(&CONVERSATION_ENTITY, "Conversation", &schema).is_ok());
    }
}
