mod common;

use std::time::Duration;

use tokio::time::Instant;

use common::{FakeDom, FakeElement};
use prompt_cast::error::ResolveError;
use prompt_cast::infrastructure::ElementRef;
use prompt_cast::models::Selector;
use prompt_cast::services::ElementResolver;

fn css(query: &str) -> Selector {
    Selector::css(query)
}

#[tokio::test(start_paused = true)]
async fn test_first_visible_candidate_in_rank_order_wins() {
    let dom = FakeDom::new()
        .with(FakeElement::input("second", css("#second")))
        .with(FakeElement::input("first", css("#first")));

    let found = ElementResolver::new(&dom)
        .resolve(&[css("#first"), css("#second")], Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(found.node, ElementRef("first".into()));
}

#[tokio::test(start_paused = true)]
async fn test_hidden_element_is_never_returned() {
    let dom = FakeDom::new()
        .with(FakeElement::input("ghost", css("#ghost")).hidden())
        .with(FakeElement::input("real", css("#real")));

    let found = ElementResolver::new(&dom)
        .resolve(&[css("#ghost"), css("#real")], Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(found.node, ElementRef("real".into()));
    assert!(found.is_visible());
}

#[tokio::test(start_paused = true)]
async fn test_only_hidden_matches_exhausts_within_budget() {
    let dom = FakeDom::new().with(FakeElement::input("ghost", css("#ghost")).hidden());
    let budget = Duration::from_secs(2);

    let started = Instant::now();
    let err = ElementResolver::new(&dom)
        .resolve(&[css("#ghost")], budget)
        .await
        .unwrap_err();

    let elapsed = started.elapsed();
    assert!(elapsed >= budget);
    assert!(elapsed <= budget + Duration::from_millis(100));
    assert_eq!(
        err,
        ResolveError::AllSelectorsExhausted {
            candidates: vec!["#ghost".into()]
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_budget_is_shared_so_late_third_candidate_resolves() {
    let dom = FakeDom::new().with(
        FakeElement::input("third", css("textarea")).appears_after(Duration::from_millis(1500)),
    );

    let started = Instant::now();
    let found = ElementResolver::new(&dom)
        .resolve(
            &[css("#gone-1"), css("#gone-2"), css("textarea")],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(found.node, ElementRef("third".into()));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1500));
    assert!(elapsed < Duration::from_millis(1700));
}

#[tokio::test(start_paused = true)]
async fn test_empty_candidate_list_fails_immediately() {
    let dom = FakeDom::new();

    let started = Instant::now();
    let err = ElementResolver::new(&dom)
        .resolve(&[], Duration::from_secs(10))
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(err, ResolveError::AllSelectorsExhausted { candidates: vec![] });
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_lists_every_candidate_in_order() {
    let dom = FakeDom::new();
    let candidates = [
        css("#a"),
        Selector::text("button", "Send"),
        css("div[contenteditable]"),
    ];

    let err = ElementResolver::new(&dom)
        .resolve(&candidates, Duration::from_millis(300))
        .await
        .unwrap_err();

    let ResolveError::AllSelectorsExhausted { candidates } = err;
    assert_eq!(
        candidates,
        vec!["#a", "button:contains('Send')", "div[contenteditable]"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_probe_error_counts_as_no_match() {
    let dom = FakeDom::new().with(FakeElement::input("ok", css("textarea")));
    dom.fail_on(css("::bogus"));

    let found = ElementResolver::new(&dom)
        .resolve(&[css("::bogus"), css("textarea")], Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(found.node, ElementRef("ok".into()));
}

#[tokio::test(start_paused = true)]
async fn test_text_selector_resolves() {
    let dom = FakeDom::new().with(FakeElement::button("send", Selector::text("button", "Send")));

    let present = ElementResolver::new(&dom)
        .is_present(&[Selector::text("button", "Send")], Duration::from_millis(200))
        .await;

    assert!(present);
}
