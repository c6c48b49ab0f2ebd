mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use common::{agent_deps, FakeDom, FakeElement, FakeHost, RecordingReporter};
use prompt_cast::models::{Catalog, InjectOptions, JobStatus, Outcome, Selector};
use prompt_cast::orchestrator::{
    spawn_response_collector, Orchestrator, ReadinessSettings, TabPool, TargetDeps,
};
use prompt_cast::services::{CatalogService, HistoryStore};
use prompt_cast::workflow::{AgentDeps, AgentSettings};
use prompt_cast::Config;

const REGISTRY: &str = r##"{
  "version": "2025.06.01",
  "platforms": {
    "kimi": {
      "selectors": {
        "input": ["div.chat-input[contenteditable]", "textarea"],
        "send": ["button.send-button"]
      }
    },
    "chatgpt": {
      "selectors": {
        "input": ["#prompt-textarea", "textarea[data-id=\"root\"]", "textarea"],
        "send": ["button[data-testid=\"send-button\"]", "button:contains('Send')"]
      },
      "limit_detect": ["div:contains('rate limit')"],
      "response": {
        "container": [".answer"],
        "stop_control": [],
        "streaming_indicator": []
      }
    }
  }
}"##;

const PROMPT: &str = "Summarize this page";

struct Harness {
    host: Arc<FakeHost>,
    reporter: Arc<RecordingReporter>,
    history: Arc<HistoryStore>,
    orchestrator: Orchestrator,
}

fn harness(deps: AgentDeps, reporter: Arc<RecordingReporter>) -> Harness {
    let host = Arc::new(FakeHost::new(deps));
    let pool = Arc::new(TabPool::new(host.clone()));
    let catalog = Catalog::from_registry_json(REGISTRY.as_bytes(), Utc::now(), None).unwrap();
    let catalog = CatalogService::new(&Config::default(), catalog);
    let history = Arc::new(HistoryStore::in_memory());

    let target_deps = TargetDeps {
        host: host.clone(),
        pool,
        reporter: reporter.clone(),
        readiness: ReadinessSettings::default(),
    };
    let orchestrator = Orchestrator::new(target_deps, catalog, history.clone(), false);

    Harness {
        host,
        reporter,
        history,
        orchestrator,
    }
}

fn default_harness() -> Harness {
    let reporter = Arc::new(RecordingReporter::default());
    harness(agent_deps(reporter.clone()), reporter)
}

fn kimi_dom() -> Arc<FakeDom> {
    Arc::new(
        FakeDom::new()
            .with(FakeElement::rich_input(
                "kimi-editor",
                Selector::css("div.chat-input[contenteditable]"),
            ))
            .with(FakeElement::button("kimi-send", Selector::css("button.send-button"))),
    )
}

fn chatgpt_dom() -> Arc<FakeDom> {
    Arc::new(
        FakeDom::new()
            .with(FakeElement::input("gpt-input", Selector::css("textarea")))
            .with(FakeElement::button("gpt-send", Selector::text("button", "Send")))
            .with(FakeElement::block("gpt-answer", Selector::css(".answer"), "")),
    )
}

fn platforms(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn paste() -> InjectOptions {
    InjectOptions {
        simulate_typing: false,
        harvest_response: false,
    }
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_to_two_platforms() {
    let h = default_harness();
    let kimi = kimi_dom();
    let chatgpt = chatgpt_dom();
    h.host.serve("https://www.kimi.com/", kimi.clone());
    h.host.serve("https://chatgpt.com/", chatgpt.clone());

    let report = h
        .orchestrator
        .inject(PROMPT, &platforms(&["kimi", "chatgpt"]), paste())
        .await;

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.success_count(), 2);
    assert_eq!(kimi.text_of("kimi-editor"), PROMPT);
    assert_eq!(kimi.clicks(), vec!["kimi-send"]);
    // 第三个候选才命中
    assert_eq!(chatgpt.text_of("gpt-input"), PROMPT);
    assert_eq!(chatgpt.clicks(), vec!["gpt-send"]);

    let history = h.history.snapshot().await;
    assert_eq!(history.prompts.len(), 1);
    assert_eq!(history.prompts[0].prompt, PROMPT);
    assert_eq!(history.prompts[0].platforms, platforms(&["kimi", "chatgpt"]));
    assert_eq!(history.results.len(), 2);
    assert!(history.results.iter().all(|r| r.success && r.job_id == report.job_id));

    let job = h.orchestrator.job_status(&report.job_id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.per_target_result.len(), 2);
    assert!(report.job_id.starts_with("inj_"));
}

#[tokio::test(start_paused = true)]
async fn test_failure_on_one_platform_is_isolated() {
    let h = default_harness();
    h.host.serve("https://www.kimi.com/", kimi_dom());

    let report = h
        .orchestrator
        .inject(PROMPT, &platforms(&["kimi", "altavista", "gemini"]), paste())
        .await;

    assert!(report.outcomes["kimi"].is_success());
    // 未知平台与目录中缺失的平台都降级为意外错误
    assert!(matches!(report.outcomes["altavista"], Outcome::UnexpectedError { .. }));
    assert!(matches!(report.outcomes["gemini"], Outcome::UnexpectedError { .. }));
    assert_eq!(h.reporter.reasons(), vec!["unexpected_error", "unexpected_error"]);

    let history = h.history.snapshot().await;
    assert_eq!(history.results.len(), 3);
    assert_eq!(history.results.iter().filter(|r| r.success).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_platforms_are_deduplicated() {
    let h = default_harness();
    let kimi = kimi_dom();
    h.host.serve("https://www.kimi.com/", kimi.clone());

    let report = h
        .orchestrator
        .inject(PROMPT, &platforms(&["kimi", "kimi"]), paste())
        .await;

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(h.host.opened().len(), 1);
    assert_eq!(kimi.clicks().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_job_reuses_pooled_page() {
    let h = default_harness();
    h.host.serve("https://www.kimi.com/", kimi_dom());

    h.orchestrator
        .inject(PROMPT, &platforms(&["kimi"]), paste())
        .await;
    let second = h
        .orchestrator
        .inject("Translate this page", &platforms(&["kimi"]), paste())
        .await;

    assert!(second.outcomes["kimi"].is_success());
    assert_eq!(h.host.opened().len(), 1);
    assert_eq!(h.host.focused().len(), 1);
    assert_eq!(h.history.snapshot().await.prompts[0].prompt, "Translate this page");
}

#[tokio::test(start_paused = true)]
async fn test_blocked_platform_reports_guidance() {
    let h = default_harness();
    let chatgpt = chatgpt_dom();
    chatgpt.add(FakeElement::block(
        "limit",
        Selector::text("div", "rate limit"),
        "You've hit the rate limit",
    ));
    h.host.serve("https://chatgpt.com/", chatgpt.clone());

    let report = h
        .orchestrator
        .inject(PROMPT, &platforms(&["chatgpt"]), paste())
        .await;

    let outcome = &report.outcomes["chatgpt"];
    assert!(outcome.guidance().unwrap().contains("1-4"));
    assert!(chatgpt.clicks().is_empty());
    let history = h.history.snapshot().await;
    assert_eq!(history.results[0].error.as_deref(), Some("blocked: RateLimit"));
}

#[tokio::test(start_paused = true)]
async fn test_harvested_response_lands_in_history() {
    let reporter = Arc::new(RecordingReporter::default());
    let (tx, rx) = mpsc::unbounded_channel();
    let deps = AgentDeps {
        settings: AgentSettings::default(),
        reporter: reporter.clone(),
        harvest_tx: Some(tx),
    };
    let h = harness(deps, reporter);
    let mut collector = spawn_response_collector(h.history.clone(), rx);

    let chatgpt = chatgpt_dom();
    let answer = "This page explains how the registry is refreshed. ".repeat(3);
    chatgpt.queue_mutation(Some(("gpt-answer", &answer)));
    chatgpt.queue_mutation(None);
    h.host.serve("https://chatgpt.com/", chatgpt);

    let options = InjectOptions {
        simulate_typing: false,
        harvest_response: true,
    };
    let report = h
        .orchestrator
        .inject(PROMPT, &platforms(&["chatgpt"]), options)
        .await;
    assert!(report.outcomes["chatgpt"].is_success());

    let started = Instant::now();
    let saved = collector
        .wait_for(report.success_count(), Duration::from_secs(185))
        .await;
    assert_eq!(saved, 1);
    assert!(started.elapsed() < Duration::from_secs(185));

    let history = h.history.snapshot().await;
    assert_eq!(history.responses.len(), 1);
    assert_eq!(history.responses[0].platform_id, "chatgpt");
    assert_eq!(history.responses[0].prompt, PROMPT);
    assert_eq!(history.responses[0].text, answer);
    collector.abort();
}

#[tokio::test(start_paused = true)]
async fn test_waiting_for_missing_response_is_bounded() {
    let reporter = Arc::new(RecordingReporter::default());
    let (tx, rx) = mpsc::unbounded_channel();
    let deps = AgentDeps {
        settings: AgentSettings::default(),
        reporter: reporter.clone(),
        harvest_tx: Some(tx),
    };
    let h = harness(deps, reporter);
    let mut collector = spawn_response_collector(h.history.clone(), rx);
    h.host.serve("https://chatgpt.com/", chatgpt_dom());

    let options = InjectOptions {
        simulate_typing: false,
        harvest_response: true,
    };
    let report = h
        .orchestrator
        .inject(PROMPT, &platforms(&["chatgpt"]), options)
        .await;
    assert!(report.outcomes["chatgpt"].is_success());

    // 页面没有产生回复，等待在上限处结束
    let started = Instant::now();
    let saved = collector.wait_for(1, Duration::from_secs(30)).await;

    assert_eq!(saved, 0);
    assert_eq!(started.elapsed(), Duration::from_secs(30));
    assert!(h.history.snapshot().await.responses.is_empty());
    collector.abort();
}
