//! USDA FoodData Central client
//!
//! Only the two calls the integrator needs: a food search and a food detail
//! fetch. See <https://fdc.nal.usda.gov/api-guide.html>.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Food lookup request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Food lookup returned HTTP {status} for {endpoint}")]
    Status { status: u16, endpoint: String },

    #[error("Food {0} not found")]
    NotFound(i64),

    #[error("Food lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodMatch {
    pub fdc_id: i64,
    pub description: String,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Nutrient value as reported for a food (per 100 g)
#[derive(Debug, Clone, PartialEq)]
pub struct FoodNutrientValue {
    pub name: String,
    pub amount: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoodDetails {
    pub fdc_id: i64,
    pub description: String,
    pub nutrients: Vec<FoodNutrientValue>,
}

/// External nutrient data provider
#[async_trait]
pub trait FoodLookup: Send + Sync {
    async fn search_foods(&self, query: &str, limit: usize) -> Result<Vec<FoodMatch>, LookupError>;

    async fn get_food_details(&self, fdc_id: i64) -> Result<FoodDetails, LookupError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    foods: Vec<FoodMatch>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailsResponse {
    fdc_id: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    food_nutrients: Vec<DetailsNutrient>,
}

#[derive(Deserialize)]
struct DetailsNutrient {
    nutrient: Option<NutrientInfo>,
    amount: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NutrientInfo {
    name: String,
    #[serde(default)]
    unit_name: String,
}

#[derive(Clone)]
pub struct FdcClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FdcClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("larder-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn check(status: StatusCode, endpoint: &str) -> Result<(), LookupError> {
        if status.is_success() {
            return Ok(());
        }
        Err(LookupError::Status {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl FoodLookup for FdcClient {
    async fn search_foods(&self, query: &str, limit: usize) -> Result<Vec<FoodMatch>, LookupError> {
        let url = format!("{}/foods/search", self.base_url);
        let page_size = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query),
                ("pageSize", page_size.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;
        Self::check(response.status(), "foods/search")?;

        let body: SearchResponse = response.json().await?;
        debug!(query, hits = body.foods.len(), "Food search completed");
        Ok(body.foods.into_iter().take(limit).collect())
    }

    async fn get_food_details(&self, fdc_id: i64) -> Result<FoodDetails, LookupError> {
        let url = format!("{}/food/{}", self.base_url, fdc_id);
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", &self.api_key)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound(fdc_id));
        }
        Self::check(response.status(), "food")?;

        let body: DetailsResponse = response.json().await?;
        let nutrients = body
            .food_nutrients
            .into_iter()
            .filter_map(|n| {
                let info = n.nutrient?;
                Some(FoodNutrientValue {
                    name: info.name,
                    amount: n.amount?,
                    unit: info.unit_name,
                })
            })
            .collect();

        Ok(FoodDetails {
            fdc_id: body.fdc_id,
            description: body.description,
            nutrients,
        })
    }
}
