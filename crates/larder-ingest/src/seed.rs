//! Reference data seeder

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::nutrients::BASELINE_NUTRIENTS;
use crate::parser::units::MEASUREMENT_UNITS;
use crate::store::{CatalogStore, StoreResult};

/// Rows created vs. already present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub measurement_types_created: u32,
    pub measurement_types_existing: u32,
    pub nutrients_created: u32,
    pub nutrients_existing: u32,
}

impl SeedReport {
    pub fn created(&self) -> u32 {
        self.measurement_types_created + self.nutrients_created
    }
}

/// Ensures measurement types and baseline nutrients exist. Idempotent.
#[derive(Clone)]
pub struct ReferenceSeeder {
    store: Arc<dyn CatalogStore>,
}

impl ReferenceSeeder {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub async fn seed_reference_data(&self) -> StoreResult<SeedReport> {
        let mut report = SeedReport::default();

        for (name, _) in MEASUREMENT_UNITS {
            let (_, created) = self.store.find_or_create_measurement_type(name).await?;
            if created {
                report.measurement_types_created += 1;
            } else {
                report.measurement_types_existing += 1;
            }
        }

        for nutrient in BASELINE_NUTRIENTS {
            let (_, created) = self
                .store
                .find_or_create_nutrient(nutrient.name, nutrient.unit)
                .await?;
            if created {
                report.nutrients_created += 1;
            } else {
                report.nutrients_existing += 1;
            }
        }

        if report.created() > 0 {
            info!(
                measurement_types = report.measurement_types_created,
                nutrients = report.nutrients_created,
                "Reference data seeded"
            );
        }
        Ok(report)
    }
}
