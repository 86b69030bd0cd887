//! Per-entity sync rules.
//!
//! The set of Aspire feeds that need special handling is closed and known at
//! compile time, so the rules live in `const` tables keyed by [`KnownEntity`].
//! Any other feed name maps to [`Entity::Other`] and is passed through as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sync rules for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityConfig {
    /// Identifier column of the entity's rows
    pub id_column: &'static str,
    /// Nested columns extracted into their own tables, in order
    pub child_entities: &'static [KnownEntity],
    /// Columns removed before writing
    pub drop_columns: &'static [&'static str],
    /// Columns coerced to strict booleans
    pub bool_columns: &'static [&'static str],
}

impl EntityConfig {
    const fn new(id_column: &'static str) -> Self {
        Self {
            id_column,
            child_entities: &[],
            drop_columns: &[],
            bool_columns: &[],
        }
    }

    const fn children(mut self, children: &'static [KnownEntity]) -> Self {
        self.child_entities = children;
        self
    }

    const fn drops(mut self, columns: &'static [&'static str]) -> Self {
        self.drop_columns = columns;
        self
    }

    const fn bools(mut self, columns: &'static [&'static str]) -> Self {
        self.bool_columns = columns;
        self
    }
}

const PROPERTIES: EntityConfig = EntityConfig::new("PropertyID")
    .children(&[KnownEntity::PropertyContacts])
    .drops(&["PropertyTags", "PropertyTakeoffItems"])
    .bools(&["SeparateInvoices", "DragDropGeoLocation"]);

const PROPERTY_CONTACTS: EntityConfig =
    EntityConfig::new("PropertyContactID").drops(&["EmailInvoiceContact"]);

const INVOICES: EntityConfig =
    EntityConfig::new("InvoiceID").children(&[KnownEntity::InvoiceOpportunities]);

const INVOICE_OPPORTUNITIES: EntityConfig = EntityConfig::new("InvoiceOpportunityID")
    .children(&[KnownEntity::InvoiceOpportunityServices]);

const INVOICE_OPPORTUNITY_SERVICES: EntityConfig =
    EntityConfig::new("InvoiceOpportunityServiceID").drops(&["InvoiceOpportunityServiceItems"]);

const WORK_TICKETS: EntityConfig = EntityConfig::new("WorkTicketID").drops(&["WorkTicketRevenues"]);

const SERVICES: EntityConfig =
    EntityConfig::new("ServiceID").drops(&["ServiceTaxOverrides", "ServiceBranches"]);

const OPPORTUNITIES: EntityConfig = EntityConfig::new("OpportunityID").drops(&[
    "ScheduleOfValueGroups",
    "OpportunityRevisions",
    "OpportunityBillings",
]);

const OPPORTUNITY_SERVICES: EntityConfig = EntityConfig::new("OpportunityServiceID").drops(&[
    "OpportunityServiceRoutes",
    "OpportunityServiceDefaultPayCodes",
]);

/// Entities with registered sync rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KnownEntity {
    /// Properties
    Properties,
    /// Contacts nested under a property
    PropertyContacts,
    /// Invoices
    Invoices,
    /// Opportunities nested under an invoice
    InvoiceOpportunities,
    /// Services nested under an invoice opportunity
    InvoiceOpportunityServices,
    /// Work tickets
    WorkTickets,
    /// Services
    Services,
    /// Opportunities
    Opportunities,
    /// Opportunity services
    OpportunityServices,
}

impl KnownEntity {
    /// Every known entity.
    pub const ALL: [KnownEntity; 9] = [
        KnownEntity::Properties,
        KnownEntity::PropertyContacts,
        KnownEntity::Invoices,
        KnownEntity::InvoiceOpportunities,
        KnownEntity::InvoiceOpportunityServices,
        KnownEntity::WorkTickets,
        KnownEntity::Services,
        KnownEntity::Opportunities,
        KnownEntity::OpportunityServices,
    ];

    /// Feed name as used by the API and in table names.
    pub const fn name(self) -> &'static str {
        match self {
            KnownEntity::Properties => "Properties",
            KnownEntity::PropertyContacts => "PropertyContacts",
            KnownEntity::Invoices => "Invoices",
            KnownEntity::InvoiceOpportunities => "InvoiceOpportunities",
            KnownEntity::InvoiceOpportunityServices => "InvoiceOpportunityServices",
            KnownEntity::WorkTickets => "WorkTickets",
            KnownEntity::Services => "Services",
            KnownEntity::Opportunities => "Opportunities",
            KnownEntity::OpportunityServices => "OpportunityServices",
        }
    }

    /// Sync rules for this entity.
    pub const fn config(self) -> &'static EntityConfig {
        match self {
            KnownEntity::Properties => &PROPERTIES,
            KnownEntity::PropertyContacts => &PROPERTY_CONTACTS,
            KnownEntity::Invoices => &INVOICES,
            KnownEntity::InvoiceOpportunities => &INVOICE_OPPORTUNITIES,
            KnownEntity::InvoiceOpportunityServices => &INVOICE_OPPORTUNITY_SERVICES,
            KnownEntity::WorkTickets => &WORK_TICKETS,
            KnownEntity::Services => &SERVICES,
            KnownEntity::Opportunities => &OPPORTUNITIES,
            KnownEntity::OpportunityServices => &OPPORTUNITY_SERVICES,
        }
    }

    /// Look up a known entity by feed name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }
}

impl fmt::Display for KnownEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An Aspire data feed, known or not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Entity {
    /// Feed with registered rules
    Known(KnownEntity),
    /// Feed without rules; passed through unchanged
    Other(String),
}

impl Entity {
    /// Parse a feed name. Never fails: unknown names become [`Entity::Other`].
    pub fn parse(name: &str) -> Self {
        KnownEntity::from_name(name)
            .map(Entity::Known)
            .unwrap_or_else(|| Entity::Other(name.to_string()))
    }

    /// Feed name.
    pub fn name(&self) -> &str {
        match self {
            Entity::Known(e) => e.name(),
            Entity::Other(name) => name,
        }
    }

    /// Sync rules, if the entity has any.
    pub fn config(&self) -> Option<&'static EntityConfig> {
        match self {
            Entity::Known(e) => Some(e.config()),
            Entity::Other(_) => None,
        }
    }
}

impl FromStr for Entity {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Entity::parse(s))
    }
}

impl From<String> for Entity {
    fn from(name: String) -> Self {
        Entity::parse(&name)
    }
}

impl From<Entity> for String {
    fn from(entity: Entity) -> Self {
        entity.name().to_string()
    }
}

impl From<KnownEntity> for Entity {
    fn from(entity: KnownEntity) -> Self {
        Entity::Known(entity)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_unknown() {
        assert_eq!(Entity::parse("Properties"), Entity::Known(KnownEntity::Properties));
        assert_eq!(Entity::parse("Branches"), Entity::Other("Branches".into()));
        assert!(Entity::parse("Branches").config().is_none());
    }

    #[test]
    fn test_names_round_trip() {
        for entity in KnownEntity::ALL {
            assert_eq!(KnownEntity::from_name(entity.name()), Some(entity));
        }
    }

    #[test]
    fn test_property_rules() {
        let config = KnownEntity::Properties.config();
        assert_eq!(config.id_column, "PropertyID");
        assert_eq!(config.child_entities, &[KnownEntity::PropertyContacts]);
        assert!(config.drop_columns.contains(&"PropertyTags"));
        assert!(config.bool_columns.contains(&"SeparateInvoices"));
    }

    #[test]
    fn test_invoice_hierarchy_is_two_levels_deep() {
        let invoices = KnownEntity::Invoices.config();
        assert_eq!(invoices.child_entities, &[KnownEntity::InvoiceOpportunities]);
        let opps = KnownEntity::InvoiceOpportunities.config();
        assert_eq!(opps.child_entities, &[KnownEntity::InvoiceOpportunityServices]);
        assert!(KnownEntity::InvoiceOpportunityServices
            .config()
            .child_entities
            .is_empty());
    }

    #[test]
    fn test_entity_serde_as_string() {
        let entity: Entity = serde_json::from_str("\"WorkTickets\"").unwrap();
        assert_eq!(entity, Entity::Known(KnownEntity::WorkTickets));
        assert_eq!(serde_json::to_string(&entity).unwrap(), "\"WorkTickets\"");
    }
}
