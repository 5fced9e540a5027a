//! Content generator integration
//!
//! Talks to a Claude-style messages API to draft plan candidates and daily
//! schedules. Every failure mode (missing key, transport, non-2xx, timeout,
//! unparseable or structurally invalid output) collapses into
//! `GenerationOutcome::Failed` so callers can fall back uniformly.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::GeneratorConfig;
use crate::fallback::schedule_id;
use crate::models::plan::{ActivityCategory, ActivityIntensity};
use crate::models::profile::parse_clock;
use crate::models::schedule::{
  AppliedAdaptation, HydrationPlan, Meal, NutritionPlan, ScheduleSource, ScheduledActivity,
};
use crate::models::{DailySchedule, DayOfWeek, DayPerformance, Difficulty, PlanCandidate, UserProfile};
use crate::progress::AdaptationDecision;

/// ---------------------------------------------------------------------------
/// Configuration
/// ---------------------------------------------------------------------------

const API_VERSION: &str = "2023-06-01";
const PLAN_MAX_TOKENS: u32 = 8000;
const SCHEDULE_MAX_TOKENS: u32 = 3000;
/// Upper bound on a generated daily water target
pub const MAX_HYDRATION_ML: u32 = 6000;

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug, Serialize)]
pub enum LlmError {
  #[error("API key not configured")]
  MissingApiKey,

  #[error("Request failed: {0}")]
  Request(String),

  #[error("API error: {0}")]
  Api(String),

  #[error("Parse error: {0}")]
  Parse(String),

  #[error("Timed out after {0}s")]
  Timeout(u64),
}

/// ---------------------------------------------------------------------------
/// Generator Contract
/// ---------------------------------------------------------------------------

/// Result of asking the generator for content
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome<T> {
  Generated(T),
  Failed { reason: String },
}

impl<T> GenerationOutcome<T> {
  pub fn failed(reason: impl Into<String>) -> Self {
    GenerationOutcome::Failed { reason: reason.into() }
  }

  pub fn ok(self) -> Option<T> {
    match self {
      GenerationOutcome::Generated(value) => Some(value),
      GenerationOutcome::Failed { .. } => None,
    }
  }
}

impl<T> From<Result<T, LlmError>> for GenerationOutcome<T> {
  fn from(result: Result<T, LlmError>) -> Self {
    match result {
      Ok(value) => GenerationOutcome::Generated(value),
      Err(e) => GenerationOutcome::failed(e.to_string()),
    }
  }
}

/// Everything the plan generator sees about the user
#[derive(Debug, Serialize)]
pub struct PlanPrompt<'a> {
  pub profile: &'a UserProfile,
  pub health_score: f64,
  pub health_analysis: &'a serde_json::Value,
  pub recommendations: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct SchedulePrompt<'a> {
  pub plan: &'a PlanCandidate,
  pub profile: &'a UserProfile,
  pub date: NaiveDate,
  pub previous_day: Option<&'a DayPerformance>,
  pub adaptation: Option<&'a AdaptationDecision>,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
  fn provider(&self) -> &str;

  /// Three validated candidates, one per tier
  async fn generate_plans(&self, prompt: &PlanPrompt<'_>) -> GenerationOutcome<Vec<PlanCandidate>>;

  async fn generate_schedule(&self, prompt: &SchedulePrompt<'_>) -> GenerationOutcome<DailySchedule>;
}

/// Stands in when no API key is configured; every call falls back
pub struct UnconfiguredGenerator;

#[async_trait]
impl ContentGenerator for UnconfiguredGenerator {
  fn provider(&self) -> &str {
    "fallback"
  }

  async fn generate_plans(&self, _prompt: &PlanPrompt<'_>) -> GenerationOutcome<Vec<PlanCandidate>> {
    GenerationOutcome::failed(LlmError::MissingApiKey.to_string())
  }

  async fn generate_schedule(&self, _prompt: &SchedulePrompt<'_>) -> GenerationOutcome<DailySchedule> {
    GenerationOutcome::failed(LlmError::MissingApiKey.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Claude API Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ClaudeRequest {
  model: String,
  max_tokens: u32,
  system: String,
  messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
  role: String,
  content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
  content: Vec<ContentBlock>,
  usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  content_type: String,
  text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
  pub input_tokens: u32,
  pub output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
  error: ClaudeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorDetail {
  message: String,
}

/// ---------------------------------------------------------------------------
/// Generated Payloads
/// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeneratedPlans {
  Wrapped { plans: Vec<serde_json::Value> },
  Bare(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
struct GeneratedActivity {
  #[serde(default)]
  id: Option<String>,
  title: String,
  category: ActivityCategory,
  time: String,
  duration_minutes: u32,
  intensity: ActivityIntensity,
  #[serde(default)]
  instructions: Vec<String>,
  #[serde(default)]
  equipment: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSchedule {
  #[serde(default)]
  theme: Option<String>,
  activities: Vec<GeneratedActivity>,
  meals: Vec<Meal>,
  #[serde(default)]
  hydration_target_ml: Option<u32>,
  #[serde(default)]
  recovery_focus: Vec<String>,
}

/// ---------------------------------------------------------------------------
/// Generator Client
/// ---------------------------------------------------------------------------

pub struct GeneratorClient {
  client: Client,
  api_key: String,
  api_url: Url,
  model: String,
  timeout: Duration,
}

impl GeneratorClient {
  pub fn new(config: &GeneratorConfig) -> Result<Self, LlmError> {
    if config.api_key.trim().is_empty() {
      return Err(LlmError::MissingApiKey);
    }
    Ok(Self {
      client: Client::new(),
      api_key: config.api_key.clone(),
      api_url: config.api_url.clone(),
      model: config.model.clone(),
      timeout: config.timeout,
    })
  }

  /// Call the messages API with a system prompt and user message, bounded by the configured timeout
  pub async fn complete(
    &self,
    system_prompt: &str,
    user_message: &str,
    max_tokens: u32,
  ) -> Result<(String, Usage), LlmError> {
    match tokio::time::timeout(self.timeout, self.send(system_prompt, user_message, max_tokens)).await {
      Ok(result) => result,
      Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
    }
  }

  async fn send(
    &self,
    system_prompt: &str,
    user_message: &str,
    max_tokens: u32,
  ) -> Result<(String, Usage), LlmError> {
    let request = ClaudeRequest {
      model: self.model.clone(),
      max_tokens,
      system: system_prompt.to_string(),
      messages: vec![ClaudeMessage {
        role: "user".to_string(),
        content: user_message.to_string(),
      }],
    };

    let response = self
      .client
      .post(self.api_url.clone())
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .header("content-type", "application/json")
      .json(&request)
      .send()
      .await
      .map_err(|e| LlmError::Request(e.to_string()))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| LlmError::Request(e.to_string()))?;

    if !status.is_success() {
      if let Ok(error_resp) = serde_json::from_str::<ClaudeErrorResponse>(&body) {
        return Err(LlmError::Api(error_resp.error.message));
      }
      return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
    }

    let claude_response: ClaudeResponse =
      serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;

    let text = claude_response
      .content
      .iter()
      .find(|c| c.content_type == "text")
      .and_then(|c| c.text.clone())
      .ok_or_else(|| LlmError::Parse("No text content in response".to_string()))?;

    Ok((text, claude_response.usage))
  }

  async fn request_plans(&self, prompt: &PlanPrompt<'_>) -> Result<Vec<PlanCandidate>, LlmError> {
    let system_prompt = include_str!("prompts/plan_system.txt");
    let context = serde_json::to_string_pretty(prompt).map_err(|e| LlmError::Parse(e.to_string()))?;
    let user_message = format!(
      r#"Design three health plans for this user.

USER CONTEXT:
{}

Respond with valid JSON matching the OUTPUT FORMAT specified in your instructions."#,
      context
    );

    let (text, usage) = self.complete(system_prompt, &user_message, PLAN_MAX_TOKENS).await?;
    log::debug!("plan generation used {} input / {} output tokens", usage.input_tokens, usage.output_tokens);

    let json_str = extract_json(&text)?;
    let parsed: GeneratedPlans =
      serde_json::from_str(&json_str).map_err(|e| LlmError::Parse(format!("{}: {}", e, json_str)))?;
    let raw = match parsed {
      GeneratedPlans::Wrapped { plans } | GeneratedPlans::Bare(plans) => plans,
    };

    pick_tiers(raw)
  }

  async fn request_schedule(&self, prompt: &SchedulePrompt<'_>) -> Result<DailySchedule, LlmError> {
    let system_prompt = include_str!("prompts/schedule_system.txt");
    let context = serde_json::to_string_pretty(prompt).map_err(|e| LlmError::Parse(e.to_string()))?;
    let user_message = format!(
      r#"Create the schedule for {} ({}).

CONTEXT:
{}

Respond with valid JSON matching the OUTPUT FORMAT specified in your instructions."#,
      prompt.date,
      DayOfWeek::from(prompt.date.weekday()),
      context
    );

    let (text, _usage) = self.complete(system_prompt, &user_message, SCHEDULE_MAX_TOKENS).await?;
    let json_str = extract_json(&text)?;
    let generated: GeneratedSchedule =
      serde_json::from_str(&json_str).map_err(|e| LlmError::Parse(format!("{}: {}", e, json_str)))?;

    into_schedule(generated, prompt)
  }
}

#[async_trait]
impl ContentGenerator for GeneratorClient {
  fn provider(&self) -> &str {
    &self.model
  }

  async fn generate_plans(&self, prompt: &PlanPrompt<'_>) -> GenerationOutcome<Vec<PlanCandidate>> {
    self.request_plans(prompt).await.into()
  }

  async fn generate_schedule(&self, prompt: &SchedulePrompt<'_>) -> GenerationOutcome<DailySchedule> {
    self.request_schedule(prompt).await.into()
  }
}

/// Keep the first valid candidate of each tier; all three tiers are required
fn pick_tiers(raw: Vec<serde_json::Value>) -> Result<Vec<PlanCandidate>, LlmError> {
  let mut valid = Vec::new();
  for value in raw {
    match serde_json::from_value::<PlanCandidate>(value) {
      Ok(plan) => match plan.validate() {
        Ok(()) => valid.push(plan),
        Err(reason) => log::warn!("discarding generated plan: {}", reason),
      },
      Err(e) => log::warn!("discarding unparseable generated plan: {}", e),
    }
  }

  let mut picked = Vec::with_capacity(3);
  for tier in Difficulty::ALL {
    match valid.iter().position(|p| p.difficulty == tier) {
      Some(idx) => picked.push(valid.swap_remove(idx)),
      None => {
        return Err(LlmError::Parse(format!("no valid {} plan among generated candidates", tier)));
      }
    }
  }

  let ids: HashSet<&str> = picked.iter().map(|p| p.id.as_str()).collect();
  if ids.len() != picked.len() {
    return Err(LlmError::Parse("generated plans share an id".to_string()));
  }

  Ok(picked)
}

fn into_schedule(generated: GeneratedSchedule, prompt: &SchedulePrompt<'_>) -> Result<DailySchedule, LlmError> {
  if generated.activities.is_empty() {
    return Err(LlmError::Parse("schedule has no activities".to_string()));
  }
  if generated.meals.is_empty() {
    return Err(LlmError::Parse("schedule has no meals".to_string()));
  }

  let mut seen = HashSet::new();
  let mut activities = Vec::with_capacity(generated.activities.len());
  for (idx, a) in generated.activities.into_iter().enumerate() {
    if parse_clock(&a.time).is_none() || a.duration_minutes == 0 {
      return Err(LlmError::Parse(format!("activity {} has invalid time or duration", a.title)));
    }
    let mut id = a.id.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| format!("activity-{}", idx + 1));
    if !seen.insert(id.clone()) {
      id = format!("{}-{}", id, idx + 1);
      seen.insert(id.clone());
    }
    activities.push(ScheduledActivity {
      id,
      title: a.title,
      category: a.category,
      time: a.time,
      duration_minutes: a.duration_minutes,
      intensity: a.intensity,
      instructions: a.instructions,
      equipment: a.equipment,
      status: Default::default(),
      actual_duration_minutes: None,
      difficulty_rating: None,
      satisfaction: None,
      notes: None,
    });
  }
  activities.sort_by_key(|a| parse_clock(&a.time));

  if let Some(meal) = generated.meals.iter().find(|m| parse_clock(&m.time).is_none()) {
    return Err(LlmError::Parse(format!("meal {} has invalid time {}", meal.name, meal.time)));
  }

  let plan = prompt.plan;
  let day = DayOfWeek::from(prompt.date.weekday());
  let template = plan.weekly_structure.day(day);
  let hydration_target = generated
    .hydration_target_ml
    .filter(|ml| *ml > 0)
    .map(|ml| ml.min(MAX_HYDRATION_ML))
    .unwrap_or(plan.nutrition_guidelines.hydration_goal_ml);

  Ok(DailySchedule {
    id: schedule_id(&prompt.profile.id, &plan.id, prompt.date),
    user_id: prompt.profile.id.clone(),
    plan_id: plan.id.clone(),
    date: prompt.date,
    day_of_week: day,
    day_type: template.day_type,
    theme: generated.theme.unwrap_or_else(|| template.theme.clone()),
    activities,
    nutrition_plan: NutritionPlan {
      daily_calories: generated.meals.iter().map(|m| m.calories).sum(),
      meals: generated.meals,
      hydration: HydrationPlan::with_target(hydration_target),
    },
    recovery_focus: generated.recovery_focus,
    adaptation: prompt.adaptation.filter(|d| d.needed).map(|d| AppliedAdaptation {
      reason: d.reason.clone(),
      change: plan.adaptation_rules.underperforming.clone(),
    }),
    source: ScheduleSource::Generated,
    created_at: Utc::now(),
  })
}

/// Extract JSON from a model response (handles markdown code blocks)
fn extract_json(text: &str) -> Result<String, LlmError> {
  let trimmed = text.trim();
  if trimmed.starts_with('{') || trimmed.starts_with('[') {
    return Ok(trimmed.to_string());
  }

  if let Some(start) = text.find("```json") {
    let start = start + 7;
    if let Some(end) = text[start..].find("```") {
      return Ok(text[start..start + end].trim().to_string());
    }
  }

  if let Some(start) = text.find("```") {
    let start = start + 3;
    // Skip language identifier if present
    let content_start = text[start..]
      .find('\n')
      .map(|i| start + i + 1)
      .unwrap_or(start);
    if let Some(end) = text[content_start..].find("```") {
      return Ok(text[content_start..content_start + end].trim().to_string());
    }
  }

  if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
    if start < end {
      return Ok(text[start..=end].to_string());
    }
  }

  Err(LlmError::Parse("Could not extract JSON from response".to_string()))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fallback::fallback_plans;
  use crate::test_utils::{mock_profile, monday};

  fn claude_body(text: &str) -> String {
    serde_json::json!({
      "content": [{"type": "text", "text": text}],
      "model": "test-model",
      "stop_reason": "end_turn",
      "usage": {"input_tokens": 10, "output_tokens": 20}
    })
    .to_string()
  }

  fn client_for(server: &mockito::ServerGuard, timeout: Duration) -> GeneratorClient {
    GeneratorClient::new(&GeneratorConfig {
      api_key: "sk-test".to_string(),
      api_url: Url::parse(&format!("{}/v1/messages", server.url())).unwrap(),
      model: "test-model".to_string(),
      timeout,
    })
    .unwrap()
  }

  #[test]
  fn test_extract_json_direct() {
    let input = r#"{"plans": []}"#;
    assert_eq!(extract_json(input).unwrap(), input);
  }

  #[test]
  fn test_extract_json_code_block() {
    let input = r#"Here are the plans:

```json
{"plans": [{"id": "a"}]}
```

Enjoy!"#;
    let result = extract_json(input).unwrap();
    assert!(result.starts_with('{'));
    assert!(result.contains("\"a\""));
  }

  #[test]
  fn test_extract_json_fallback() {
    let input = r#"The schedule is {"theme": "x"} as requested."#;
    assert_eq!(extract_json(input).unwrap(), r#"{"theme": "x"}"#);
  }

  #[test]
  fn test_extract_json_none() {
    assert!(extract_json("no json here").is_err());
  }

  #[test]
  fn test_pick_tiers_requires_all_three() {
    let mut plans = fallback_plans(&mock_profile("user-1"));
    plans.pop();
    let raw = plans.iter().map(|p| serde_json::to_value(p).unwrap()).collect();

    assert!(pick_tiers(raw).is_err());
  }

  #[test]
  fn test_pick_tiers_skips_invalid_candidates() {
    let plans = fallback_plans(&mock_profile("user-1"));
    let mut broken = plans[0].clone();
    broken.id = "broken".into();
    broken.duration_weeks = 0;
    let mut raw: Vec<serde_json::Value> = vec![serde_json::to_value(&broken).unwrap(), serde_json::json!({"id": 1})];
    raw.extend(plans.iter().map(|p| serde_json::to_value(p).unwrap()));

    let picked = pick_tiers(raw).unwrap();

    assert_eq!(picked.len(), 3);
    assert_eq!(picked[0].id, plans[0].id);
  }

  #[tokio::test]
  async fn test_generate_plans_success() {
    // Arrange
    let profile = mock_profile("user-1");
    let plans = fallback_plans(&profile);
    let text = serde_json::json!({ "plans": plans }).to_string();
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/v1/messages")
      .match_header("x-api-key", "sk-test")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(claude_body(&format!("```json\n{}\n```", text)))
      .create_async()
      .await;
    let client = client_for(&server, Duration::from_secs(5));
    let analysis = serde_json::json!({});

    // Act
    let outcome = client
      .generate_plans(&PlanPrompt {
        profile: &profile,
        health_score: 50.0,
        health_analysis: &analysis,
        recommendations: &[],
      })
      .await;

    // Assert
    mock.assert_async().await;
    let generated = outcome.ok().unwrap();
    assert_eq!(generated.len(), 3);
    assert_eq!(generated, plans);
  }

  #[tokio::test]
  async fn test_generate_plans_api_error_fails() {
    let profile = mock_profile("user-1");
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(529)
      .with_body(r#"{"error": {"message": "overloaded"}}"#)
      .create_async()
      .await;
    let client = client_for(&server, Duration::from_secs(5));
    let analysis = serde_json::json!({});

    let outcome = client
      .generate_plans(&PlanPrompt {
        profile: &profile,
        health_score: 50.0,
        health_analysis: &analysis,
        recommendations: &[],
      })
      .await;

    assert_eq!(outcome, GenerationOutcome::failed("API error: overloaded"));
  }

  #[tokio::test]
  async fn test_generate_schedule_fills_identity_from_plan() {
    // Arrange
    let profile = mock_profile("user-1");
    let plan = fallback_plans(&profile).remove(1);
    let body = serde_json::json!({
      "theme": "Strength day",
      "activities": [
        {"id": "lift", "title": "Strength Training", "category": "exercise", "time": "17:30", "duration_minutes": 40, "intensity": "moderate"},
        {"id": "lift", "title": "Meditation", "category": "mindfulness", "time": "06:45", "duration_minutes": 10, "intensity": "low"}
      ],
      "meals": [
        {"meal_type": "breakfast", "name": "Eggs", "time": "07:15", "calories": 450},
        {"meal_type": "dinner", "name": "Salmon", "time": "19:00", "calories": 650}
      ]
    })
    .to_string();
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(200)
      .with_body(claude_body(&body))
      .create_async()
      .await;
    let client = client_for(&server, Duration::from_secs(5));

    // Act
    let schedule = client
      .generate_schedule(&SchedulePrompt {
        plan: &plan,
        profile: &profile,
        date: monday(),
        previous_day: None,
        adaptation: None,
      })
      .await
      .ok()
      .unwrap();

    // Assert
    assert_eq!(schedule.source, ScheduleSource::Generated);
    assert_eq!(schedule.plan_id, plan.id);
    assert_eq!(schedule.activities[0].time, "06:45");
    assert_ne!(schedule.activities[0].id, schedule.activities[1].id);
    assert_eq!(schedule.nutrition_plan.daily_calories, 1100);
    assert_eq!(schedule.nutrition_plan.hydration.target_ml, plan.nutrition_guidelines.hydration_goal_ml);
  }

  #[test]
  fn test_generated_hydration_target_is_capped() {
    let profile = mock_profile("user-1");
    let plan = fallback_plans(&profile).remove(1);
    let generated: GeneratedSchedule = serde_json::from_value(serde_json::json!({
      "activities": [
        {"id": "walk", "title": "Walk", "category": "exercise", "time": "07:00", "duration_minutes": 30, "intensity": "low"}
      ],
      "meals": [{"meal_type": "breakfast", "name": "Oats", "time": "07:30", "calories": 400}],
      "hydration_target_ml": 900_000
    }))
    .unwrap();
    let prompt = SchedulePrompt {
      plan: &plan,
      profile: &profile,
      date: monday(),
      previous_day: None,
      adaptation: None,
    };

    let schedule = into_schedule(generated, &prompt).unwrap();

    assert_eq!(schedule.nutrition_plan.hydration.target_ml, MAX_HYDRATION_ML);
  }

  #[tokio::test]
  async fn test_generate_schedule_rejects_bad_clock() {
    let profile = mock_profile("user-1");
    let plan = fallback_plans(&profile).remove(0);
    let body = serde_json::json!({
      "activities": [{"title": "Walk", "category": "exercise", "time": "noon", "duration_minutes": 20, "intensity": "low"}],
      "meals": [{"meal_type": "lunch", "name": "Soup", "time": "12:00", "calories": 400}]
    })
    .to_string();
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/v1/messages")
      .with_status(200)
      .with_body(claude_body(&body))
      .create_async()
      .await;
    let client = client_for(&server, Duration::from_secs(5));

    let outcome = client
      .generate_schedule(&SchedulePrompt {
        plan: &plan,
        profile: &profile,
        date: monday(),
        previous_day: None,
        adaptation: None,
      })
      .await;

    assert!(matches!(outcome, GenerationOutcome::Failed { .. }));
  }

  #[tokio::test]
  async fn test_unconfigured_generator_always_fails() {
    let profile = mock_profile("user-1");
    let analysis = serde_json::json!({});
    let outcome = UnconfiguredGenerator
      .generate_plans(&PlanPrompt {
        profile: &profile,
        health_score: 80.0,
        health_analysis: &analysis,
        recommendations: &[],
      })
      .await;

    assert_eq!(outcome, GenerationOutcome::failed("API key not configured"));
  }
}
