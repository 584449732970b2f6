use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ForgeError;
use crate::store::Record;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    pub id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Trend score in `10..=100`, set once the idea has been validated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    pub validated: bool,
    pub created_at: DateTime<Utc>,
}

impl Record for Idea {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub idea_id: Uuid,
    pub name: String,
    pub slug: String,
    pub status: String,
    pub repository: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Product {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Vercel,
    Railway,
}

impl Platform {
    pub fn url_for(self, slug: &str) -> String {
        match self {
            Platform::Vercel => format!("https://{slug}.vercel.app"),
            Platform::Railway => format!("https://{slug}.up.railway.app"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Vercel => write!(f, "vercel"),
            Platform::Railway => write!(f, "railway"),
        }
    }
}

impl FromStr for Platform {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vercel" => Ok(Platform::Vercel),
            "railway" => Ok(Platform::Railway),
            other => Err(ForgeError::InvalidInput(format!(
                "unsupported platform '{other}', expected vercel or railway"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: Uuid,
    pub product_id: Uuid,
    pub platform: Platform,
    pub status: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Deployment {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: Uuid,
    pub rating: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for Feedback {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarketAnalysis {
    pub idea: String,
    pub market_size: String,
    pub growth_potential: u8,
    pub competition_level: u8,
    pub barriers_to_entry: u8,
    pub target_audience: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeoContent {
    pub product_id: Uuid,
    pub posts: Vec<String>,
}

// ---------------------------------------------------------------------------
// Product flow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    IdeaScraper,
    Validator,
    MvpBuilder,
    Deployer,
    SeoBot,
}

/// One pipeline stage: how many records went in and how many came out.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowStep {
    pub stage: FlowStage,
    pub input_count: usize,
    pub output_count: usize,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductFlowRun {
    pub steps: Vec<FlowStep>,
    /// Every scraped idea with its trend score.
    pub ideas: Vec<Idea>,
    pub products: Vec<Product>,
    pub deployments: Vec<Deployment>,
    pub seo: Vec<SeoContent>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIdeaRequest {
    pub title: String,
    pub description: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub idea_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct MarketAnalysisRequest {
    pub idea: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentRequest {
    pub product_id: Uuid,
    pub platform: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFeedbackRequest {
    pub rating: i64,
    pub message: String,
    pub email: Option<String>,
}
