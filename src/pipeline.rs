use std::sync::Arc;

use serde_json::json;

use crate::io_struct::{
    GenerateRequest, GenerateResponse, GeoPlan, ParseRequest, ParsedPlan, PipelineResult,
};
use crate::notify::{Notification, Notify, RunContext};
use crate::registry::RequestRegistry;
use crate::stage::Stage;
use crate::stage_client::{StageClient, StageError};

const PLAN_PREVIEW_CHARS: usize = 200;

/// Sequences the four stage calls for one run: generate → parse → geocode →
/// render. Strictly sequential; the first failing stage terminates the run.
pub struct Coordinator {
    stages: StageClient,
    notifier: Arc<dyn Notify>,
    registry: Arc<RequestRegistry>,
}

impl Coordinator {
    pub fn new(
        stages: StageClient,
        notifier: Arc<dyn Notify>,
        registry: Arc<RequestRegistry>,
    ) -> Self {
        Coordinator {
            stages,
            notifier,
            registry,
        }
    }

    /// Runs the pipeline and writes the terminal registry state exactly once.
    /// Never returns an error to the caller; failures live in the registry.
    pub async fn execute(&self, ctx: RunContext, user_input: String) {
        match self.run(&ctx, &user_input).await {
            Ok(result) => {
                self.registry.complete(&ctx.request_id, result);
            }
            Err(err) => {
                log::error!("[{}] orchestration failed: {err}", ctx.request_id);
                self.registry.fail(&ctx.request_id, err.to_string());
            }
        }
    }

    /// The four-stage state machine. Each boundary threads the previous
    /// stage's output into the next call; content is never branched on, only
    /// success or failure.
    pub async fn run(
        &self,
        ctx: &RunContext,
        user_input: &str,
    ) -> Result<PipelineResult, StageError> {
        let generated: GenerateResponse = self
            .stages
            .call_json(ctx, Stage::Generation, &GenerateRequest::new(user_input))
            .await?;
        let travel_plan = generated.raw_text;
        self.milestone(
            ctx,
            "Travel plan generated successfully",
            json!({ "travel_plan": preview(&travel_plan) }),
        )
        .await;

        let parsed: ParsedPlan = self
            .stages
            .call_json(
                ctx,
                Stage::Extraction,
                &ParseRequest {
                    raw_text: travel_plan.clone(),
                    user_input: Some(user_input.to_string()),
                },
            )
            .await?;
        self.milestone(
            ctx,
            "Travel plan parsed successfully",
            json!({ "parsed_data": parsed.summary() }),
        )
        .await;

        // The parse output goes to geocoding verbatim; unknown fields ride
        // in the flattened remainder.
        let enriched: GeoPlan = self.stages.call_json(ctx, Stage::Geocoding, &parsed).await?;
        self.milestone(
            ctx,
            "Geotagging completed successfully",
            json!({ "geo_data": enriched.summary() }),
        )
        .await;

        let map_html = self.stages.call_text(ctx, Stage::Rendering, &enriched).await?;
        self.milestone(ctx, "Map rendered successfully", json!({})).await;

        Ok(PipelineResult {
            travel_plan,
            map_html,
            enriched_data: enriched,
        })
    }

    async fn milestone(&self, ctx: &RunContext, message: &str, details: serde_json::Value) {
        self.registry.record_milestone(&ctx.request_id, message);
        let notification = Notification::success(message).with_details(details);
        self.notifier
            .notify(&ctx.request_id, &notification, ctx.callback_url.as_deref())
            .await;
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > PLAN_PREVIEW_CHARS {
        let head: String = text.chars().take(PLAN_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
