//! Concept-to-column requirements for the educational reply.
//!
//! Some questions need data the schema simply lacks ("profit margin" without
//! a cost column). The table below maps business concepts to the columns
//! they require, each with a type, an example value, and alternative column
//! names the user might already have. Detection is deterministic and never
//! calls the model.

use serde::Serialize;

use crate::sources::resolver::ResolvedData;

/// A column the user would need to add for a concept to be answerable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredColumn {
    /// Canonical column name.
    pub name: String,

    /// Suggested data type.
    pub data_type: String,

    /// Example value to show in the educational reply.
    pub example: String,

    /// Other column names that would satisfy the requirement.
    pub alternatives: Vec<String>,
}

struct CatalogColumn {
    name:         &'static str,
    data_type:    &'static str,
    example:      &'static str,
    alternatives: &'static [&'static str],
}

impl CatalogColumn {
    fn to_required(&self) -> RequiredColumn {
        RequiredColumn {
            name:         self.name.to_string(),
            data_type:    self.data_type.to_string(),
            example:      self.example.to_string(),
            alternatives: self.alternatives.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

struct ConceptRequirement {
    /// Phrases that signal the concept.
    phrases: &'static [&'static str],
    /// Columns the concept needs.
    columns: &'static [CatalogColumn],
}

const CONCEPTS: &[ConceptRequirement] = &[
    ConceptRequirement {
        phrases: &["profit", "margin", "profitability"],
        columns: &[CatalogColumn {
            name:         "cost",
            data_type:    "numeric",
            example:      "42.50",
            alternatives: &["cogs", "unit_cost", "expenses"],
        }],
    },
    ConceptRequirement {
        phrases: &["churn", "retention", "customer lifetime"],
        columns: &[
            CatalogColumn {
                name:         "customer_id",
                data_type:    "text",
                example:      "CUST-1042",
                alternatives: &["customer", "client_id", "account_id"],
            },
            CatalogColumn {
                name:         "cancelled_at",
                data_type:    "date",
                example:      "2025-11-30",
                alternatives: &["churn_date", "end_date", "closed_at"],
            },
        ],
    },
    ConceptRequirement {
        phrases: &["conversion rate", "conversion", "funnel"],
        columns: &[CatalogColumn {
            name:         "conversions",
            data_type:    "integer",
            example:      "18",
            alternatives: &["signups", "purchases", "completed"],
        }],
    },
    ConceptRequirement {
        phrases: &["inventory", "stock level", "out of stock"],
        columns: &[CatalogColumn {
            name:         "stock",
            data_type:    "integer",
            example:      "250",
            alternatives: &["inventory", "quantity_on_hand", "units_in_stock"],
        }],
    },
    ConceptRequirement {
        phrases: &["acquisition cost", "cac", "marketing spend"],
        columns: &[CatalogColumn {
            name:         "marketing_spend",
            data_type:    "numeric",
            example:      "1200.00",
            alternatives: &["ad_spend", "campaign_cost"],
        }],
    },
];

/// The curated entry for a column name the planner flagged, if we have one.
#[must_use]
pub fn catalog_entry(name: &str) -> Option<RequiredColumn> {
    let lower = name.to_lowercase();
    CONCEPTS
        .iter()
        .flat_map(|concept| concept.columns)
        .find(|column| column.name == lower || column.alternatives.contains(&lower.as_str()))
        .map(CatalogColumn::to_required)
}

/// Columns the question needs that the resolved schema does not have.
///
/// Only columns absent from every handle are returned; a concept whose
/// requirement is satisfiable by an alternative name is not missing.
#[must_use]
pub fn detect_missing(message: &str, data: &ResolvedData) -> Vec<RequiredColumn> {
    let normalized = message.to_lowercase();
    let mut missing: Vec<RequiredColumn> = Vec::new();

    for concept in CONCEPTS {
        if !concept.phrases.iter().any(|p| normalized.contains(p)) {
            continue;
        }
        for required in concept.columns {
            let satisfied = data.find_column(required.name)
                || required.alternatives.iter().copied().any(|alt| data.find_column(alt));
            if !satisfied && !missing.iter().any(|m| m.name == required.name) {
                missing.push(required.to_required());
            }
        }
    }
    missing
}
