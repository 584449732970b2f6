use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use tracing::instrument;
use uuid::Uuid;

use crate::error::ForgeError;
use crate::service::ForgeState;
use crate::types::{
    CreateDeploymentRequest, CreateFeedbackRequest, CreateIdeaRequest, CreateProductRequest,
    Deployment, Feedback, Idea, MarketAnalysis, MarketAnalysisRequest, Product, ProductFlowRun,
    SeoContent, SeoRequest,
};

type Forge = State<Arc<ForgeState>>;

pub async fn list_ideas(State(state): Forge) -> Json<Vec<Idea>> {
    Json(state.list_ideas())
}

pub async fn create_idea(
    State(state): Forge,
    Json(body): Json<CreateIdeaRequest>,
) -> Result<(StatusCode, Json<Idea>), ForgeError> {
    let idea = state.create_idea(body)?;
    Ok((StatusCode::CREATED, Json(idea)))
}

pub async fn get_idea(State(state): Forge, Path(id): Path<Uuid>) -> Result<Json<Idea>, ForgeError> {
    state.get_idea(id).map(Json)
}

pub async fn delete_idea(
    State(state): Forge,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ForgeError> {
    state.delete_idea(id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn generate_ideas(State(state): Forge) -> Json<Vec<Idea>> {
    Json(state.generate_ideas())
}

#[instrument(skip(state))]
pub async fn validate_idea(
    State(state): Forge,
    Path(id): Path<Uuid>,
) -> Result<Json<Idea>, ForgeError> {
    state.validate_idea(id).map(Json)
}

pub async fn list_products(State(state): Forge) -> Json<Vec<Product>> {
    Json(state.list_products())
}

#[instrument(skip(state, body), fields(idea_id = %body.idea_id))]
pub async fn create_product(
    State(state): Forge,
    Json(body): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ForgeError> {
    let product = state.create_product(body.idea_id)?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product(
    State(state): Forge,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, ForgeError> {
    state.get_product(id).map(Json)
}

pub async fn market_analysis(
    State(state): Forge,
    Json(body): Json<MarketAnalysisRequest>,
) -> Result<Json<MarketAnalysis>, ForgeError> {
    state.market_analysis(&body.idea).map(Json)
}

pub async fn seo_content(
    State(state): Forge,
    Json(body): Json<SeoRequest>,
) -> Result<Json<SeoContent>, ForgeError> {
    state.seo_content(body.product_id).map(Json)
}

#[instrument(skip(state, body), fields(product_id = %body.product_id, platform = %body.platform))]
pub async fn create_deployment(
    State(state): Forge,
    Json(body): Json<CreateDeploymentRequest>,
) -> Result<(StatusCode, Json<Deployment>), ForgeError> {
    let deployment = state.create_deployment(body)?;
    Ok((StatusCode::CREATED, Json(deployment)))
}

pub async fn get_deployment(
    State(state): Forge,
    Path(id): Path<Uuid>,
) -> Result<Json<Deployment>, ForgeError> {
    state.get_deployment(id).map(Json)
}

pub async fn submit_feedback(
    State(state): Forge,
    Json(body): Json<CreateFeedbackRequest>,
) -> Result<(StatusCode, Json<Feedback>), ForgeError> {
    let feedback = state.submit_feedback(body)?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

pub async fn list_feedback(State(state): Forge) -> Json<Vec<Feedback>> {
    Json(state.list_feedback())
}

#[instrument(skip(state))]
pub async fn run_product_flow(State(state): Forge) -> Result<Json<ProductFlowRun>, ForgeError> {
    state.run_product_flow().map(Json)
}
