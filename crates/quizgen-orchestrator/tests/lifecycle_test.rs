//! Intake, topic and generation flows through the orchestrator.

mod helpers;

use chrono::{Duration, Utc};
use helpers::*;
use quizgen_db::test_fixtures::unique_request;
use quizgen_inference::mock::{ANALYSIS_UNAVAILABLE, GENERATION_UNAVAILABLE};
use quizgen_inference::MockGenerationBackend;
use quizgen_orchestrator::{
    Actor, Error, GenerationControl, NewTopic, OrchestratorConfig, OrchestratorEvent,
    QuestionType, RequestRepository, RequestStatus, TopicRepository,
};

use QuestionType::{Essay, MultipleChoice, ShortAnswer, TrueFalse};

#[tokio::test]
async fn test_quota_allocation_over_selected_topics() {
    let h = harness(MockGenerationBackend::new().with_topics(["Cells", "Genetics", "Evolution"]));
    let actor = Actor::user(7);
    let (request, topics) = topics_ready(&h, &actor, "Biology notes").await;
    assert_eq!(request.status, RequestStatus::TopicsReady);
    assert_eq!(topics.len(), 3);

    let outcome = h
        .orchestrator
        .configure(
            &actor,
            request.id,
            config(10, &[(MultipleChoice, 4), (TrueFalse, 3), (ShortAnswer, 3)]),
            &ids(&topics),
        )
        .await
        .unwrap();
    let quotas: Vec<u32> = outcome.topics.iter().map(|t| t.quota).collect();
    assert_eq!(quotas, vec![4, 3, 3]);
    assert_eq!(outcome.request.status, RequestStatus::Configured);
    assert_eq!(outcome.plan.total(), 10);
    let totals = outcome.plan.type_totals();
    assert_eq!(totals[&MultipleChoice], 4);
    assert_eq!(totals[&TrueFalse], 3);
    assert_eq!(totals[&ShortAnswer], 3);

    let report = h
        .orchestrator
        .generate(&actor, request.id, &GenerationControl::new())
        .await
        .unwrap();
    assert_eq!(report.generated, 10);
    assert!(report.failed_slots.is_empty());
    assert_eq!(report.request.status, RequestStatus::Completed);
    assert!(report.request.completed_at.is_some());
    assert_eq!(h.repo.question_total(), 10);
}

#[tokio::test]
async fn test_unselected_topics_get_no_quota() {
    let h = harness(MockGenerationBackend::new().with_topics(["Cells", "Genetics", "Evolution"]));
    let actor = Actor::user(7);
    let (request, topics) = topics_ready(&h, &actor, "Biology notes").await;

    // Selection order does not matter; display order gets the remainder.
    let outcome = h
        .orchestrator
        .configure(
            &actor,
            request.id,
            config(5, &[(TrueFalse, 5)]),
            &[topics[2].id, topics[0].id],
        )
        .await
        .unwrap();
    let quotas: Vec<(bool, u32)> = outcome.topics.iter().map(|t| (t.selected, t.quota)).collect();
    assert_eq!(quotas, vec![(true, 3), (false, 0), (true, 2)]);
}

#[tokio::test]
async fn test_type_count_mismatch_is_rejected() {
    let h = harness(MockGenerationBackend::new().with_topics(["Cells"]));
    let actor = Actor::user(7);
    let (request, topics) = topics_ready(&h, &actor, "Biology notes").await;

    let err = h
        .orchestrator
        .configure(
            &actor,
            request.id,
            config(10, &[(MultipleChoice, 4), (TrueFalse, 4)]),
            &ids(&topics),
        )
        .await
        .unwrap_err();
    match err {
        Error::Validation(message) => assert_eq!(message, "type counts sum to 8, expected 10"),
        other => panic!("expected validation error, got {other:?}"),
    }

    let status = h
        .orchestrator
        .get_request_status(&actor, request.id)
        .await
        .unwrap();
    assert_eq!(status.request.status, RequestStatus::TopicsReady);
    assert!(status.request.configuration.is_none());
}

#[tokio::test]
async fn test_percentage_drift_only_warns() {
    let h = harness(MockGenerationBackend::new().with_topics(["Cells"]));
    let actor = Actor::user(7);
    let (request, topics) = topics_ready(&h, &actor, "Biology notes").await;

    let skewed = config(2, &[(TrueFalse, 2)])
        .with_difficulty([(quizgen_orchestrator::Difficulty::Easy, 50)].into_iter().collect());
    let outcome = h
        .orchestrator
        .configure(&actor, request.id, skewed, &ids(&topics))
        .await
        .unwrap();
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].field, "difficulty");
}

#[tokio::test]
async fn test_empty_inputs_are_rejected() {
    let h = harness(MockGenerationBackend::new());
    let err = h
        .orchestrator
        .create_request(&Actor::user(7), COLLECTION, Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(h.ai.call_count("analyze"), 0);
}

#[tokio::test]
async fn test_analysis_failure_fails_request_verbatim() {
    let h = harness(MockGenerationBackend::new().with_failing_analysis());
    let actor = Actor::user(7);
    let err = h
        .orchestrator
        .create_request(&actor, COLLECTION, text_inputs("Biology notes"))
        .await
        .unwrap_err();

    let request_id = match err {
        Error::RequestFailed {
            request_id,
            message,
        } => {
            assert_eq!(message, ANALYSIS_UNAVAILABLE);
            request_id
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    };

    let status = h
        .orchestrator
        .get_request_status(&actor, request_id)
        .await
        .unwrap();
    assert_eq!(status.request.status, RequestStatus::Failed);
    assert_eq!(status.request.error.as_deref(), Some(ANALYSIS_UNAVAILABLE));
}

#[tokio::test]
async fn test_identical_content_reuses_topics() {
    let ai = MockGenerationBackend::new().with_topics(["Cells", "Genetics"]);
    let h = harness(ai.clone());
    let actor = Actor::user(7);
    let (first, _) = generated(&h, &actor, "Same notes", config(2, &[(TrueFalse, 2)])).await;
    assert_eq!(ai.call_count("analyze"), 1);

    let second = h
        .orchestrator
        .create_request(&actor, COLLECTION, text_inputs("Same notes"))
        .await
        .unwrap();
    assert_eq!(second.reused_from, Some(first.id));
    assert_eq!(second.status, RequestStatus::TopicsReady);
    assert_eq!(ai.call_count("analyze"), 1);

    let original = h.orchestrator.list_topics(&actor, first.id).await.unwrap();
    let copies = h.orchestrator.list_topics(&actor, second.id).await.unwrap();
    let titles = |topics: &[quizgen_orchestrator::Topic]| {
        topics.iter().map(|t| t.title.clone()).collect::<Vec<_>>()
    };
    assert_eq!(titles(&original), titles(&copies));
    assert!(copies.iter().all(|c| original.iter().all(|o| o.id != c.id)));
    assert!(copies.iter().all(|c| c.request_id == second.id));

    // Another owner never reuses.
    let other = h
        .orchestrator
        .create_request(&Actor::user(8), COLLECTION, text_inputs("Same notes"))
        .await
        .unwrap();
    assert_eq!(other.reused_from, None);
    assert_eq!(ai.call_count("analyze"), 2);
}

#[tokio::test]
async fn test_failed_topic_reuse_fails_the_request() {
    let ai = MockGenerationBackend::new().with_topics(["Cells"]);
    let h = harness(ai.clone());
    let actor = Actor::user(7);
    generated(&h, &actor, "Same notes", config(1, &[(TrueFalse, 1)])).await;
    h.repo.fail_topic_inserts(true).unwrap();

    let err = h
        .orchestrator
        .create_request(&actor, COLLECTION, text_inputs("Same notes"))
        .await
        .unwrap_err();
    let request_id = match err {
        Error::RequestFailed { request_id, message } => {
            assert_eq!(message, "Internal error: topic store unavailable");
            request_id
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    };
    assert_eq!(ai.call_count("analyze"), 1);

    let status = h
        .orchestrator
        .get_request_status(&actor, request_id)
        .await
        .unwrap();
    assert_eq!(status.request.status, RequestStatus::Failed);
    assert!(status.request.reused_from.is_some());
    assert_eq!(status.topic_count, 0);
}

#[tokio::test]
async fn test_reuse_window_expires() {
    let ai = MockGenerationBackend::new().with_topics(["Cells"]);
    let h = harness(ai.clone());
    let actor = Actor::user(7);
    let (first, _) = generated(&h, &actor, "Old notes", config(1, &[(TrueFalse, 1)])).await;
    h.repo
        .set_created_at(first.id, Utc::now() - Duration::days(31))
        .unwrap();

    let again = h
        .orchestrator
        .create_request(&actor, COLLECTION, text_inputs("Old notes"))
        .await
        .unwrap();
    assert_eq!(again.reused_from, None);
    assert_eq!(ai.call_count("analyze"), 2);
}

#[tokio::test]
async fn test_normalize_merges_case_variants() {
    let h = harness(MockGenerationBackend::new());
    let actor = Actor::user(7);
    let request = h
        .repo
        .insert(unique_request(actor.user_id, COLLECTION))
        .await
        .unwrap();
    h.repo
        .force_status(request.id, RequestStatus::Configured)
        .unwrap();

    let mut cells = NewTopic::new("Cell Biology");
    cells.selected = true;
    cells.quota = 3;
    cells.learning_objectives = vec!["Describe organelles".into()];
    let mut variant = NewTopic::new("cell biology ");
    variant.selected = true;
    variant.quota = 2;
    variant.learning_objectives = vec!["Explain mitosis".into()];
    TopicRepository::insert_many(
        &*h.repo,
        request.id,
        vec![cells, variant, NewTopic::new("Genetics")],
    )
    .await
    .unwrap();

    let absorbed = h
        .orchestrator
        .normalize_topics(&actor, request.id)
        .await
        .unwrap();
    assert_eq!(absorbed, 1);

    let topics = h.orchestrator.list_topics(&actor, request.id).await.unwrap();
    assert_eq!(topics.len(), 2);
    assert_eq!(topics[0].title, "Cell Biology");
    assert_eq!(topics[0].quota, 5);
    assert_eq!(
        topics[0].learning_objectives,
        vec!["Describe organelles", "Explain mitosis"]
    );

    // Changing topics of a configured request reopens selection.
    let status = h
        .orchestrator
        .get_request_status(&actor, request.id)
        .await
        .unwrap();
    assert_eq!(status.request.status, RequestStatus::TopicsReady);

    // A second pass finds nothing to do.
    assert_eq!(
        h.orchestrator
            .normalize_topics(&actor, request.id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_merge_rename_and_remove_topics() {
    let h = harness(MockGenerationBackend::new().with_topics(["Cells", "Genetics", "Evolution"]));
    let actor = Actor::user(7);
    let (request, topics) = topics_ready(&h, &actor, "Biology notes").await;

    let merged = h
        .orchestrator
        .merge_topics(&actor, request.id, topics[0].id, topics[1].id)
        .await
        .unwrap();
    assert_eq!(merged.title, "Cells & Genetics");

    let err = h
        .orchestrator
        .rename_topic(&actor, request.id, topics[2].id, "cells & genetics")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let renamed = h
        .orchestrator
        .rename_topic(&actor, request.id, topics[2].id, "SECTION: Natural Selection")
        .await
        .unwrap();
    assert_eq!(renamed.title, "Natural Selection");

    let removed = h
        .orchestrator
        .remove_topics(&actor, request.id, &[topics[2].id])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    let left = h.orchestrator.list_topics(&actor, request.id).await.unwrap();
    assert_eq!(left.len(), 1);

    let err = h
        .orchestrator
        .select_topics(&actor, request.id, &[topics[2].id])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_merge_refuses_title_taken_by_another_topic() {
    let h = harness(MockGenerationBackend::new().with_topics(["Cells", "Genes", "Cells & Genes"]));
    let actor = Actor::user(7);
    let (request, topics) = topics_ready(&h, &actor, "Biology notes").await;
    assert_eq!(topics.len(), 3);

    let err = h
        .orchestrator
        .merge_topics(&actor, request.id, topics[0].id, topics[1].id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let after = h.orchestrator.list_topics(&actor, request.id).await.unwrap();
    let titles: Vec<&str> = after.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Cells", "Genes", "Cells & Genes"]);
    assert_eq!(h.repo.call_count("apply_merges"), 0);
}

#[tokio::test]
async fn test_topics_are_frozen_after_generation() {
    let h = harness(MockGenerationBackend::new().with_topics(["Cells"]));
    let actor = Actor::user(7);
    let (request, report) = generated(&h, &actor, "Notes", config(1, &[(TrueFalse, 1)])).await;
    assert_eq!(report.request.status, RequestStatus::Completed);

    let topics = h.orchestrator.list_topics(&actor, request.id).await.unwrap();
    let err = h
        .orchestrator
        .select_topics(&actor, request.id, &ids(&topics))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn test_failed_slot_does_not_stop_siblings() {
    let h = harness(
        MockGenerationBackend::new()
            .with_topics(["Cells", "Genetics"])
            .with_failing_topic("Genetics"),
    );
    let actor = Actor::user(7);
    let (_, report) = generated(&h, &actor, "Notes", config(4, &[(TrueFalse, 4)])).await;

    assert_eq!(report.generated, 2);
    assert_eq!(report.failed_slots.len(), 1);
    assert_eq!(report.failed_slots[0].message, GENERATION_UNAVAILABLE);
    assert_eq!(report.request.status, RequestStatus::Completed);
}

#[tokio::test]
async fn test_every_slot_failing_fails_request() {
    let h = harness(
        MockGenerationBackend::new()
            .with_topics(["Cells"])
            .with_failing_topic("Cells"),
    );
    let actor = Actor::user(7);
    let (request, topics) = topics_ready(&h, &actor, "Notes").await;
    let err = h
        .orchestrator
        .configure_and_generate(
            &actor,
            request.id,
            config(3, &[(TrueFalse, 2), (Essay, 1)]),
            &ids(&topics),
            &GenerationControl::new(),
        )
        .await
        .unwrap_err();

    match err {
        Error::RequestFailed { message, .. } => assert_eq!(message, GENERATION_UNAVAILABLE),
        other => panic!("expected RequestFailed, got {other:?}"),
    }
    let status = h
        .orchestrator
        .get_request_status(&actor, request.id)
        .await
        .unwrap();
    assert_eq!(status.request.status, RequestStatus::Failed);
    assert_eq!(status.request.error.as_deref(), Some(GENERATION_UNAVAILABLE));
}

#[tokio::test(start_paused = true)]
async fn test_time_budget_stops_generation_and_keeps_questions() {
    let h = harness_with_config(
        MockGenerationBackend::new()
            .with_topics(["Cells", "Genetics"])
            .with_latency_ms(1_000),
        OrchestratorConfig::default().with_generation_budget(1, 0),
    );
    let actor = Actor::user(7);
    let (request, topics) = topics_ready(&h, &actor, "Notes").await;
    let err = h
        .orchestrator
        .configure_and_generate(
            &actor,
            request.id,
            config(2, &[(TrueFalse, 2)]),
            &ids(&topics),
            &GenerationControl::new(),
        )
        .await
        .unwrap_err();

    match err {
        Error::RequestFailed { message, .. } => {
            assert_eq!(message, "generation exceeded its time budget of 1s")
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
    assert_eq!(h.ai.call_count("generate"), 1);
    assert_eq!(h.repo.question_total(), 1);
}

#[tokio::test]
async fn test_cancelled_generation_makes_no_calls() {
    let h = harness(MockGenerationBackend::new().with_topics(["Cells"]));
    let actor = Actor::user(7);
    let (request, topics) = topics_ready(&h, &actor, "Notes").await;
    h.orchestrator
        .configure(&actor, request.id, config(2, &[(TrueFalse, 2)]), &ids(&topics))
        .await
        .unwrap();

    let control = GenerationControl::new();
    control.cancel();
    let err = h
        .orchestrator
        .generate(&actor, request.id, &control)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequestFailed { ref message, .. } if message == "generation was cancelled"));
    assert_eq!(h.ai.call_count("generate"), 0);
}

#[tokio::test]
async fn test_generate_requires_configured_request() {
    let h = harness(MockGenerationBackend::new());
    let actor = Actor::user(7);
    let (request, _) = topics_ready(&h, &actor, "Notes").await;
    let err = h
        .orchestrator
        .generate(&actor, request.id, &GenerationControl::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn test_short_drafts_are_topped_up_with_distractors() {
    let h = harness(
        MockGenerationBackend::new()
            .with_topics(["Cells"])
            .with_short_options(),
    );
    let actor = Actor::user(7);
    let (request, _) = generated(&h, &actor, "Notes", config(2, &[(MultipleChoice, 2)])).await;

    assert_eq!(h.ai.call_count("generate_distractors"), 2);
    for question in questions(&h, &actor, request.id).await {
        assert_eq!(question.answers.len(), 4);
        assert_eq!(question.answers.iter().filter(|a| a.is_correct()).count(), 1);
        assert!(question
            .answers
            .iter()
            .any(|a| a.body == "Plausible distractor 1"));
    }
}

#[tokio::test]
async fn test_essay_without_key_gets_model_answer() {
    let h = harness(
        MockGenerationBackend::new()
            .with_topics(["Cells"])
            .with_essay_without_key(),
    );
    let actor = Actor::user(7);
    let (request, _) = generated(&h, &actor, "Notes", config(1, &[(Essay, 1)])).await;

    let questions = questions(&h, &actor, request.id).await;
    assert_eq!(questions.len(), 1);
    assert!(questions[0].general_feedback.starts_with("Model answer for: "));
    assert_eq!(h.ai.call_count("generate_answer_key"), 1);
}

#[tokio::test]
async fn test_invalid_drafts_are_discarded() {
    let h = harness(
        MockGenerationBackend::new()
            .with_topics(["Cells"])
            .with_invalid_shapes(),
    );
    let actor = Actor::user(7);
    let (_, report) = generated(&h, &actor, "Notes", config(2, &[(TrueFalse, 2)])).await;

    assert_eq!(report.generated, 0);
    assert_eq!(report.discarded.len(), 2);
    assert!(report.discarded[0].reason.contains("expected exactly 2 options"));
    assert_eq!(h.repo.question_total(), 0);
}

#[tokio::test]
async fn test_status_changes_are_broadcast() {
    let h = harness(MockGenerationBackend::new().with_topics(["Cells"]));
    let mut events = h.orchestrator.events().subscribe();
    let actor = Actor::user(7);
    generated(&h, &actor, "Notes", config(1, &[(TrueFalse, 1)])).await;

    let mut transitions = Vec::new();
    let mut finished = false;
    while let Ok(envelope) = events.try_recv() {
        match envelope.payload {
            OrchestratorEvent::RequestStatusChanged { to, .. } => transitions.push(to),
            OrchestratorEvent::GenerationFinished { generated, .. } => {
                assert_eq!(generated, 1);
                finished = true;
            }
            _ => {}
        }
    }
    assert!(finished);
    assert_eq!(
        transitions,
        vec![
            RequestStatus::Analyzing,
            RequestStatus::TopicsReady,
            RequestStatus::Configured,
            RequestStatus::Generating,
            RequestStatus::Completed,
        ]
    );
}
