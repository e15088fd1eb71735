pub mod routes;

use serde::Serialize;

use crate::evaluation::{Flag, Variant};

// MODELS

#[derive(Debug, Serialize)]
pub struct VariantSummary {
    pub uuid: String,
    pub label: String,
}

#[derive(Debug, Serialize)]
pub struct FlagSummary {
    pub id: String,
    pub label: String,
    pub description: String,
    pub variants: Vec<VariantSummary>,
    pub algorithms: usize,
}

#[derive(Debug, Serialize)]
pub struct FlagListResponse {
    pub flags: Vec<FlagSummary>,
}

// HELPER FUNCTIONS

impl From<&Variant> for VariantSummary {
    fn from(variant: &Variant) -> Self {
        Self {
            uuid: variant.uuid.clone(),
            label: variant.label.clone(),
        }
    }
}

impl From<&Flag> for FlagSummary {
    fn from(flag: &Flag) -> Self {
        Self {
            id: flag.id.clone(),
            label: flag.label.clone(),
            description: flag.description.clone(),
            variants: flag.variants.iter().map(VariantSummary::from).collect(),
            algorithms: flag.algorithms().len(),
        }
    }
}
