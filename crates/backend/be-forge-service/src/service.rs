use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::catalog::{self, MAX_TREND_SCORE, MIN_TREND_SCORE, SCRAPED_IDEAS, VALIDATION_THRESHOLD};
use crate::error::ForgeError;
use crate::store::{MemoryStore, RecordStore};
use crate::types::{
    CreateDeploymentRequest, CreateFeedbackRequest, CreateIdeaRequest, Deployment, Feedback,
    FlowStage, FlowStep, Idea, MarketAnalysis, Platform, Product, ProductFlowRun, SeoContent,
};

const MAX_FEEDBACK_LEN: usize = 5000;

pub struct ForgeState {
    pub ideas: Arc<dyn RecordStore<Idea>>,
    pub products: Arc<dyn RecordStore<Product>>,
    pub deployments: Arc<dyn RecordStore<Deployment>>,
    pub feedback: Arc<dyn RecordStore<Feedback>>,
}

fn non_empty(value: &str, field: &str) -> Result<String, ForgeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ForgeError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ForgeState {
    pub fn in_memory() -> Self {
        Self {
            ideas: Arc::new(MemoryStore::<Idea>::new()),
            products: Arc::new(MemoryStore::<Product>::new()),
            deployments: Arc::new(MemoryStore::<Deployment>::new()),
            feedback: Arc::new(MemoryStore::<Feedback>::new()),
        }
    }

    // ---------------------------------------------------------------------------
    // Ideas
    // ---------------------------------------------------------------------------

    pub fn create_idea(&self, request: CreateIdeaRequest) -> Result<Idea, ForgeError> {
        let idea = Idea {
            id: Uuid::now_v7(),
            title: non_empty(&request.title, "title")?,
            description: optional(request.description),
            source_url: optional(request.source_url),
            score: None,
            validated: false,
            created_at: Utc::now(),
        };
        self.ideas.insert(idea.clone());
        info!(idea_id = %idea.id, "Idea created");
        Ok(idea)
    }

    pub fn list_ideas(&self) -> Vec<Idea> {
        self.ideas.list()
    }

    pub fn get_idea(&self, id: Uuid) -> Result<Idea, ForgeError> {
        self.ideas
            .get(id)
            .ok_or_else(|| ForgeError::not_found("idea", id))
    }

    pub fn delete_idea(&self, id: Uuid) -> Result<(), ForgeError> {
        self.ideas
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ForgeError::not_found("idea", id))
    }

    /// Stores and returns the scraped suggestions.
    pub fn generate_ideas(&self) -> Vec<Idea> {
        let now = Utc::now();
        let ideas: Vec<Idea> = SCRAPED_IDEAS
            .iter()
            .map(|scraped| Idea {
                id: Uuid::now_v7(),
                title: scraped.title.to_string(),
                description: None,
                source_url: Some(scraped.url.to_string()),
                score: None,
                validated: false,
                created_at: now,
            })
            .collect();

        for idea in &ideas {
            self.ideas.insert(idea.clone());
        }
        info!(count = ideas.len(), "Generated ideas");
        ideas
    }

    pub fn validate_idea(&self, id: Uuid) -> Result<Idea, ForgeError> {
        let score = rand::rng().random_range(MIN_TREND_SCORE..=MAX_TREND_SCORE);
        self.score_idea(id, score)
    }

    fn score_idea(&self, id: Uuid, score: u8) -> Result<Idea, ForgeError> {
        let idea = self
            .ideas
            .update(id, &mut |idea| {
                idea.score = Some(score);
                idea.validated = score > VALIDATION_THRESHOLD;
            })
            .ok_or_else(|| ForgeError::not_found("idea", id))?;
        info!(idea_id = %id, score, validated = idea.validated, "Idea validated");
        Ok(idea)
    }

    // ---------------------------------------------------------------------------
    // Products
    // ---------------------------------------------------------------------------

    pub fn create_product(&self, idea_id: Uuid) -> Result<Product, ForgeError> {
        let idea = self.get_idea(idea_id)?;
        let slug = catalog::slugify(&idea.title);
        if slug.is_empty() {
            return Err(ForgeError::InvalidInput(format!(
                "idea title '{}' has no usable characters",
                idea.title
            )));
        }

        let product = Product {
            id: Uuid::now_v7(),
            idea_id,
            name: idea.title,
            repository: format!("github.com/commandcore/{slug}"),
            slug,
            status: "built".to_string(),
            created_at: Utc::now(),
        };
        self.products.insert(product.clone());
        info!(product_id = %product.id, %idea_id, "Product built");
        Ok(product)
    }

    pub fn list_products(&self) -> Vec<Product> {
        self.products.list()
    }

    pub fn get_product(&self, id: Uuid) -> Result<Product, ForgeError> {
        self.products
            .get(id)
            .ok_or_else(|| ForgeError::not_found("product", id))
    }

    // ---------------------------------------------------------------------------
    // Market
    // ---------------------------------------------------------------------------

    pub fn market_analysis(&self, idea: &str) -> Result<MarketAnalysis, ForgeError> {
        let idea = non_empty(idea, "idea")?;
        Ok(catalog::market_analysis(&idea))
    }

    pub fn seo_content(&self, product_id: Uuid) -> Result<SeoContent, ForgeError> {
        let product = self.get_product(product_id)?;
        Ok(SeoContent {
            product_id,
            posts: catalog::seo_titles(&product.name),
        })
    }

    // ---------------------------------------------------------------------------
    // Deploy
    // ---------------------------------------------------------------------------

    pub fn create_deployment(
        &self,
        request: CreateDeploymentRequest,
    ) -> Result<Deployment, ForgeError> {
        let platform: Platform = request.platform.parse()?;
        self.deploy(request.product_id, platform)
    }

    fn deploy(&self, product_id: Uuid, platform: Platform) -> Result<Deployment, ForgeError> {
        let product = self.get_product(product_id)?;

        let deployment = Deployment {
            id: Uuid::now_v7(),
            product_id: product.id,
            platform,
            status: "deployed".to_string(),
            url: platform.url_for(&product.slug),
            created_at: Utc::now(),
        };
        self.deployments.insert(deployment.clone());
        info!(deployment_id = %deployment.id, %platform, "Product deployed");
        Ok(deployment)
    }

    pub fn get_deployment(&self, id: Uuid) -> Result<Deployment, ForgeError> {
        self.deployments
            .get(id)
            .ok_or_else(|| ForgeError::not_found("deployment", id))
    }

    // ---------------------------------------------------------------------------
    // Feedback
    // ---------------------------------------------------------------------------

    pub fn submit_feedback(&self, request: CreateFeedbackRequest) -> Result<Feedback, ForgeError> {
        let rating = u8::try_from(request.rating)
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| {
                ForgeError::InvalidInput(format!(
                    "rating must be between 1 and 5, got {}",
                    request.rating
                ))
            })?;

        let message = non_empty(&request.message, "message")?;
        if message.chars().count() > MAX_FEEDBACK_LEN {
            return Err(ForgeError::InvalidInput(format!(
                "message must be at most {MAX_FEEDBACK_LEN} characters"
            )));
        }

        let feedback = Feedback {
            id: Uuid::now_v7(),
            rating,
            message,
            email: optional(request.email),
            created_at: Utc::now(),
        };
        self.feedback.insert(feedback.clone());
        info!(feedback_id = %feedback.id, rating, "Feedback received");
        Ok(feedback)
    }

    pub fn list_feedback(&self) -> Vec<Feedback> {
        self.feedback.list()
    }

    // ---------------------------------------------------------------------------
    // Product flow
    // ---------------------------------------------------------------------------

    /// Scrapes ideas, scores them, then builds, deploys and markets every
    /// idea that clears the validation threshold.
    pub fn run_product_flow(&self) -> Result<ProductFlowRun, ForgeError> {
        let mut rng = rand::rng();
        self.run_product_flow_scored(|_| rng.random_range(MIN_TREND_SCORE..=MAX_TREND_SCORE))
    }

    /// [`ForgeState::run_product_flow`] with trend scores supplied by `score`.
    pub fn run_product_flow_scored(
        &self,
        mut score: impl FnMut(&Idea) -> u8,
    ) -> Result<ProductFlowRun, ForgeError> {
        let mut steps = Vec::with_capacity(5);

        let scraped = self.generate_ideas();
        steps.push(flow_step(FlowStage::IdeaScraper, 0, scraped.len()));

        let ideas = scraped
            .iter()
            .map(|idea| self.score_idea(idea.id, score(idea)))
            .collect::<Result<Vec<_>, _>>()?;
        let validated: Vec<&Idea> = ideas.iter().filter(|idea| idea.validated).collect();
        steps.push(flow_step(FlowStage::Validator, ideas.len(), validated.len()));

        let products = validated
            .iter()
            .map(|idea| self.create_product(idea.id))
            .collect::<Result<Vec<_>, _>>()?;
        steps.push(flow_step(FlowStage::MvpBuilder, validated.len(), products.len()));

        let deployments = products
            .iter()
            .map(|product| self.deploy(product.id, Platform::Vercel))
            .collect::<Result<Vec<_>, _>>()?;
        steps.push(flow_step(FlowStage::Deployer, products.len(), deployments.len()));

        let seo = deployments
            .iter()
            .map(|deployment| self.seo_content(deployment.product_id))
            .collect::<Result<Vec<_>, _>>()?;
        steps.push(flow_step(FlowStage::SeoBot, deployments.len(), seo.len()));

        info!(
            scraped = ideas.len(),
            launched = deployments.len(),
            "Product flow finished"
        );

        Ok(ProductFlowRun {
            steps,
            ideas,
            products,
            deployments,
            seo,
        })
    }
}

fn flow_step(stage: FlowStage, input_count: usize, output_count: usize) -> FlowStep {
    FlowStep {
        stage,
        input_count,
        output_count,
        completed_at: Utc::now(),
    }
}

impl Default for ForgeState {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idea_request(title: &str) -> CreateIdeaRequest {
        CreateIdeaRequest {
            title: title.to_string(),
            description: None,
            source_url: None,
        }
    }

    #[test]
    fn create_idea_rejects_blank_titles() {
        let state = ForgeState::in_memory();
        let err = state.create_idea(idea_request("   ")).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidInput(_)));
        assert!(state.list_ideas().is_empty());
    }

    #[test]
    fn generate_stores_the_scraped_ideas() {
        let state = ForgeState::in_memory();
        let ideas = state.generate_ideas();

        assert_eq!(ideas.len(), SCRAPED_IDEAS.len());
        assert_eq!(
            ideas[0].title,
            "Build a tool that converts any website to an API"
        );
        assert_eq!(state.list_ideas(), ideas);
    }

    #[test]
    fn validation_score_decides_validated() {
        let state = ForgeState::in_memory();
        let idea = state.create_idea(idea_request("Habit tracker")).unwrap();

        for _ in 0..50 {
            let validated = state.validate_idea(idea.id).unwrap();
            let score = validated.score.unwrap();
            assert!((MIN_TREND_SCORE..=MAX_TREND_SCORE).contains(&score));
            assert_eq!(validated.validated, score > VALIDATION_THRESHOLD);
        }
    }

    #[test]
    fn validating_unknown_idea_is_not_found() {
        let state = ForgeState::in_memory();
        let err = state.validate_idea(Uuid::now_v7()).unwrap_err();
        assert!(matches!(err, ForgeError::NotFound { resource: "idea", .. }));
    }

    #[test]
    fn product_is_built_from_idea() {
        let state = ForgeState::in_memory();
        let idea = state
            .create_idea(idea_request("Privacy-focused alternative to Google Analytics"))
            .unwrap();

        let product = state.create_product(idea.id).unwrap();

        assert_eq!(product.status, "built");
        assert_eq!(
            product.repository,
            "github.com/commandcore/privacy-focused-alternative-to-google-analytics"
        );
        assert_eq!(state.get_product(product.id).unwrap(), product);
    }

    #[test]
    fn seo_content_uses_product_name() {
        let state = ForgeState::in_memory();
        let idea = state.create_idea(idea_request("Forge")).unwrap();
        let product = state.create_product(idea.id).unwrap();

        let seo = state.seo_content(product.id).unwrap();

        assert_eq!(seo.posts.len(), 3);
        assert_eq!(seo.posts[1], "Why Forge is the Next Big Thing in Tech");
    }

    #[test]
    fn deployment_url_follows_platform() {
        let state = ForgeState::in_memory();
        let idea = state.create_idea(idea_request("Todo App")).unwrap();
        let product = state.create_product(idea.id).unwrap();

        let deployment = state
            .create_deployment(CreateDeploymentRequest {
                product_id: product.id,
                platform: "railway".to_string(),
            })
            .unwrap();

        assert_eq!(deployment.status, "deployed");
        assert_eq!(deployment.url, "https://todo-app.up.railway.app");
        assert_eq!(state.get_deployment(deployment.id).unwrap(), deployment);
    }

    #[test]
    fn product_flow_launches_only_ideas_above_threshold() {
        let state = ForgeState::in_memory();
        let mut scores = [50, 51, 10, 100, 75].into_iter();

        let run = state
            .run_product_flow_scored(|_| scores.next().unwrap())
            .unwrap();

        let stages: Vec<FlowStage> = run.steps.iter().map(|step| step.stage).collect();
        assert_eq!(
            stages,
            [
                FlowStage::IdeaScraper,
                FlowStage::Validator,
                FlowStage::MvpBuilder,
                FlowStage::Deployer,
                FlowStage::SeoBot,
            ]
        );
        let counts: Vec<(usize, usize)> = run
            .steps
            .iter()
            .map(|step| (step.input_count, step.output_count))
            .collect();
        assert_eq!(counts, [(0, 5), (5, 3), (3, 3), (3, 3), (3, 3)]);
        assert!(
            run.steps
                .windows(2)
                .all(|pair| pair[0].completed_at <= pair[1].completed_at)
        );

        let scored: Vec<(Option<u8>, bool)> = run
            .ideas
            .iter()
            .map(|idea| (idea.score, idea.validated))
            .collect();
        assert_eq!(
            scored,
            [
                (Some(50), false),
                (Some(51), true),
                (Some(10), false),
                (Some(100), true),
                (Some(75), true),
            ]
        );

        let names: Vec<&str> = run.products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "AI-powered code review assistant for small teams",
                "Open source Figma alternative with real-time collaboration",
                "Self-hosted email marketing platform for developers",
            ]
        );
        assert_eq!(
            run.deployments[0].url,
            "https://ai-powered-code-review-assistant-for-small-teams.vercel.app"
        );
        assert!(
            run.deployments
                .iter()
                .all(|d| d.platform == Platform::Vercel && d.status == "deployed")
        );
        assert_eq!(
            run.seo[2].posts[0],
            "10 Ways Self-hosted email marketing platform for developers Can Revolutionize Your Workflow"
        );

        assert_eq!(state.list_ideas().len(), 5);
        assert_eq!(state.list_products(), run.products);
    }

    #[test]
    fn product_flow_stops_after_validation_when_nothing_passes() {
        let state = ForgeState::in_memory();

        let run = state.run_product_flow_scored(|_| VALIDATION_THRESHOLD).unwrap();

        assert_eq!(run.steps.len(), 5);
        assert_eq!(run.steps[1].output_count, 0);
        assert!(run.steps[2..].iter().all(|step| step.input_count == 0));
        assert!(run.products.is_empty());
        assert!(run.deployments.is_empty());
        assert!(run.seo.is_empty());
    }

    #[test]
    fn random_product_flow_is_consistent() {
        let state = ForgeState::in_memory();

        let run = state.run_product_flow().unwrap();

        let validated = run.ideas.iter().filter(|idea| idea.validated).count();
        assert_eq!(run.products.len(), validated);
        assert_eq!(run.deployments.len(), validated);
        assert_eq!(run.seo.len(), validated);
    }

    #[test]
    fn feedback_rating_must_be_in_range() {
        let state = ForgeState::in_memory();
        for rating in [0, 6, -1] {
            let err = state
                .submit_feedback(CreateFeedbackRequest {
                    rating,
                    message: "ok".into(),
                    email: None,
                })
                .unwrap_err();
            assert!(matches!(err, ForgeError::InvalidInput(_)));
        }
        assert!(state.list_feedback().is_empty());
    }

    #[test]
    fn feedback_message_must_not_be_blank() {
        let state = ForgeState::in_memory();
        let err = state
            .submit_feedback(CreateFeedbackRequest {
                rating: 4,
                message: "\n".into(),
                email: None,
            })
            .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidInput(_)));
    }
}
