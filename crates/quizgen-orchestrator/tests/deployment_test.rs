//! Deployment, diagnosis, repair and administrative reset.

mod helpers;

use helpers::*;
use quizgen_inference::MockGenerationBackend;
use quizgen_orchestrator::{
    Actor, DeploymentTarget, DiagnoseScope, Error, QuestionStatus, QuestionType, RequestStatus,
    VersionStatus,
};
use uuid::Uuid;

/// A completed request with `total` true/false questions, `approve` of them approved.
async fn approved_setup(total: u32, approve: usize) -> (Harness, Actor, Uuid, Vec<Uuid>) {
    let h = harness(MockGenerationBackend::new().with_topics(["Cells"]));
    let actor = Actor::user(7);
    let (request, _) = generated(
        &h,
        &actor,
        "Cell notes",
        config(total, &[(QuestionType::TrueFalse, total)]),
    )
    .await;
    let ids: Vec<Uuid> = questions(&h, &actor, request.id)
        .await
        .iter()
        .map(|q| q.id)
        .collect();
    if approve > 0 {
        h.orchestrator
            .bulk_approve(&actor, request.id, &ids[..approve])
            .await
            .unwrap();
    }
    (h, actor, request.id, ids)
}

fn category(name: &str) -> DeploymentTarget {
    DeploymentTarget::Category { name: name.into() }
}

async fn store_ids(h: &Harness, actor: &Actor, request_id: Uuid) -> Vec<i64> {
    questions(h, actor, request_id)
        .await
        .iter()
        .filter_map(|q| q.store_question_id)
        .collect()
}

#[tokio::test]
async fn test_only_approved_questions_are_deployed() {
    let (h, actor, request_id, _) = approved_setup(10, 7).await;

    let report = h
        .orchestrator
        .deploy(&actor, request_id, category("Week 1"))
        .await
        .unwrap();
    assert_eq!(report.deployed, 7);
    assert_eq!(report.skipped, 0);
    assert!(report.category_id.is_some());
    assert_eq!(h.bank.imported_count(), 7);

    let status = h
        .orchestrator
        .get_request_status(&actor, request_id)
        .await
        .unwrap();
    assert_eq!(status.question_counts[&QuestionStatus::Deployed], 7);
    assert_eq!(status.question_counts[&QuestionStatus::Pending], 3);

    // Deploying again is a no-op.
    let again = h
        .orchestrator
        .deploy(&actor, request_id, category("Week 1"))
        .await
        .unwrap();
    assert_eq!(again.deployed, 0);
    assert_eq!(again.skipped, 7);
    assert_eq!(h.bank.imported_count(), 7);
}

#[tokio::test]
async fn test_nothing_approved_is_a_validation_error() {
    let (h, actor, request_id, _) = approved_setup(2, 0).await;
    let err = h
        .orchestrator
        .deploy(&actor, request_id, category("Week 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(h.bank.call_count("ensure_category"), 0);
}

#[tokio::test]
async fn test_partial_import_failure_retries_only_the_remainder() {
    let (h, actor, request_id, ids) = approved_setup(4, 4).await;
    h.bank.fail_imports_for(&ids[..2]).unwrap();

    let err = h
        .orchestrator
        .deploy(&actor, request_id, category("Week 1"))
        .await
        .unwrap_err();
    let Error::PartialFailure(partial) = err else {
        panic!("expected a partial failure");
    };
    assert_eq!(partial.operation, "deploy");
    assert_eq!(partial.succeeded.len(), 2);
    assert_eq!(partial.failed.len(), 2);
    assert!(partial.failed.iter().any(|f| f.id == ids[0].to_string()));
    assert_eq!(partial.container_id, None);
    assert_eq!(h.bank.imported_count(), 2);

    h.bank.clear_faults().unwrap();
    let report = h
        .orchestrator
        .deploy(&actor, request_id, category("Week 1"))
        .await
        .unwrap();
    assert_eq!(report.deployed, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(h.bank.imported_count(), 4);

    let status = h
        .orchestrator
        .get_request_status(&actor, request_id)
        .await
        .unwrap();
    assert_eq!(status.question_counts[&QuestionStatus::Deployed], 4);
}

#[tokio::test]
async fn test_partial_quiz_deployment_resumes_into_same_quiz() {
    let (h, actor, request_id, ids) = approved_setup(3, 3).await;
    h.bank.fail_imports_for(&ids[..1]).unwrap();

    let err = h
        .orchestrator
        .deploy(
            &actor,
            request_id,
            DeploymentTarget::NewQuiz {
                name: "Cells quiz".into(),
                category: "Cells".into(),
            },
        )
        .await
        .unwrap_err();
    let Error::PartialFailure(partial) = err else {
        panic!("expected a partial failure");
    };
    let quiz_id = partial.container_id.expect("quiz id");
    assert_eq!(h.bank.quiz_questions(quiz_id).len(), 2);

    h.bank.clear_faults().unwrap();
    let report = h
        .orchestrator
        .deploy(
            &actor,
            request_id,
            DeploymentTarget::ExistingQuiz {
                quiz_id,
                category: "Cells".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(report.deployed, 1);
    assert_eq!(report.quiz_id, Some(quiz_id));
    assert_eq!(h.bank.quiz_questions(quiz_id).len(), 3);
    assert_eq!(h.bank.imported_count(), 3);
    assert_eq!(h.bank.call_count("create_quiz"), 1);
}

#[tokio::test]
async fn test_attach_failure_keeps_question_imported_for_retry() {
    let (h, actor, request_id, _) = approved_setup(2, 2).await;
    // Fresh bank: category 1, then store questions 2 and 3, then the quiz.
    h.bank.fail_attach_for(&[2]).unwrap();

    let err = h
        .orchestrator
        .deploy(
            &actor,
            request_id,
            DeploymentTarget::NewQuiz {
                name: "Cells quiz".into(),
                category: "Cells".into(),
            },
        )
        .await
        .unwrap_err();
    let Error::PartialFailure(partial) = err else {
        panic!("expected a partial failure");
    };
    assert_eq!(partial.failed.len(), 1);
    let quiz_id = partial.container_id.expect("quiz id");
    assert_eq!(h.bank.quiz_questions(quiz_id), vec![3]);

    let stuck: Vec<_> = questions(&h, &actor, request_id)
        .await
        .into_iter()
        .filter(|q| q.status == QuestionStatus::Approved)
        .collect();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].store_question_id, Some(2));

    h.bank.clear_faults().unwrap();
    let report = h
        .orchestrator
        .deploy(
            &actor,
            request_id,
            DeploymentTarget::ExistingQuiz {
                quiz_id,
                category: "Cells".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(report.deployed, 1);
    assert_eq!(h.bank.quiz_questions(quiz_id), vec![3, 2]);
    assert_eq!(h.bank.imported_count(), 2);
    assert_eq!(h.bank.call_count("import_questions"), 1);
}

#[tokio::test]
async fn test_regenerated_question_is_imported_again() {
    let (h, actor, request_id, _) = approved_setup(2, 2).await;
    h.bank.fail_attach_for(&[2]).unwrap();
    let err = h
        .orchestrator
        .deploy(
            &actor,
            request_id,
            DeploymentTarget::NewQuiz {
                name: "Cells quiz".into(),
                category: "Cells".into(),
            },
        )
        .await
        .unwrap_err();
    let Error::PartialFailure(partial) = err else {
        panic!("expected a partial failure");
    };
    let quiz_id = partial.container_id.expect("quiz id");
    let stuck = questions(&h, &actor, request_id)
        .await
        .into_iter()
        .find(|q| q.status == QuestionStatus::Approved)
        .expect("question left approved");
    assert_eq!(stuck.store_question_id, Some(2));

    let regenerated = h.orchestrator.regenerate(&actor, stuck.id).await.unwrap();
    assert_eq!(regenerated.store_question_id, None);
    h.orchestrator.approve(&actor, stuck.id).await.unwrap();

    h.bank.clear_faults().unwrap();
    h.orchestrator
        .deploy(
            &actor,
            request_id,
            DeploymentTarget::ExistingQuiz {
                quiz_id,
                category: "Cells".into(),
            },
        )
        .await
        .unwrap();

    let deployed = h.orchestrator.get_question(&actor, stuck.id).await.unwrap();
    assert_eq!(deployed.status, QuestionStatus::Deployed);
    let store_id = deployed.store_question_id.expect("store id");
    assert_ne!(store_id, 2);
    assert_eq!(h.bank.record(store_id).unwrap().question.body, regenerated.body);
    assert_eq!(h.bank.quiz_questions(quiz_id), vec![3, store_id]);
    assert_eq!(h.bank.call_count("import_questions"), 2);
}

#[tokio::test]
async fn test_reordered_question_is_imported_again() {
    let (h, actor, request_id, ids) = approved_setup(1, 1).await;
    h.orchestrator
        .deploy(
            &actor,
            request_id,
            DeploymentTarget::NewQuiz {
                name: "Cells quiz".into(),
                category: "Cells".into(),
            },
        )
        .await
        .unwrap();
    // Deployed questions keep their link; reordering them is refused.
    let err = h
        .orchestrator
        .reorder_answers(&actor, ids[0], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let (h, actor, request_id, ids) = approved_setup(1, 1).await;
    h.bank.fail_attach_for(&[2]).unwrap();
    h.orchestrator
        .deploy(
            &actor,
            request_id,
            DeploymentTarget::NewQuiz {
                name: "Cells quiz".into(),
                category: "Cells".into(),
            },
        )
        .await
        .unwrap_err();
    let question = h.orchestrator.get_question(&actor, ids[0]).await.unwrap();
    assert_eq!(question.store_question_id, Some(2));

    let mut order: Vec<Uuid> = question.sorted_answers().iter().map(|a| a.id).collect();
    order.reverse();
    let reordered = h
        .orchestrator
        .reorder_answers(&actor, ids[0], &order)
        .await
        .unwrap();
    assert_eq!(reordered.store_question_id, None);
    assert_eq!(reordered.status, QuestionStatus::Approved);
}

#[tokio::test]
async fn test_diagnose_and_repair_drifted_links() {
    let (h, actor, request_id, _) = approved_setup(3, 3).await;
    h.orchestrator
        .deploy(&actor, request_id, category("Week 1"))
        .await
        .unwrap();
    let stored = store_ids(&h, &actor, request_id).await;
    assert_eq!(stored.len(), 3);

    h.bank.seed_entry_category(stored[0], Some(999)).unwrap();
    h.bank.seed_entry_category(stored[1], None).unwrap();

    let report = h
        .orchestrator
        .diagnose(&actor, DiagnoseScope::Collection(COLLECTION))
        .await
        .unwrap();
    assert_eq!(report.questions.len(), 3);
    assert_eq!(report.with_issues, 2);
    assert!(!report.is_consistent());

    let repaired = h.orchestrator.repair(&actor, COLLECTION).await.unwrap();
    assert_eq!(repaired.category_updates, 2);
    assert_eq!(repaired.writes, 2);
    assert_eq!(h.bank.call_count("set_entry_category"), 1);

    let second = h.orchestrator.repair(&actor, COLLECTION).await.unwrap();
    assert_eq!(second.writes, 0);

    let report = h
        .orchestrator
        .diagnose(&actor, DiagnoseScope::Request(request_id))
        .await
        .unwrap();
    assert!(report.is_consistent());
    assert!(report.awaiting_import.is_empty());
}

#[tokio::test]
async fn test_repair_publishes_draft_versions() {
    let (h, actor, request_id, _) = approved_setup(2, 2).await;
    h.orchestrator
        .deploy(&actor, request_id, category("Week 1"))
        .await
        .unwrap();
    let stored = store_ids(&h, &actor, request_id).await;
    h.bank
        .seed_version_status(stored[1], VersionStatus::Draft)
        .unwrap();

    let repaired = h.orchestrator.repair(&actor, COLLECTION).await.unwrap();
    assert_eq!(repaired.versions_published, 1);
    assert_eq!(repaired.writes, 1);
    assert_eq!(
        h.bank.record(stored[1]).unwrap().version_status,
        VersionStatus::Ready
    );
}

#[tokio::test]
async fn test_repair_reports_failed_batches() {
    let (h, actor, request_id, _) = approved_setup(2, 2).await;
    h.orchestrator
        .deploy(&actor, request_id, category("Week 1"))
        .await
        .unwrap();
    let stored = store_ids(&h, &actor, request_id).await;
    h.bank.seed_entry_category(stored[0], None).unwrap();
    h.bank.fail_category_updates(true).unwrap();

    let err = h.orchestrator.repair(&actor, COLLECTION).await.unwrap_err();
    let Error::PartialFailure(partial) = err else {
        panic!("expected a partial failure");
    };
    assert_eq!(partial.operation, "repair");
    assert_eq!(partial.failed.len(), 1);
    assert_eq!(partial.failed[0].id, stored[0].to_string());
}

#[tokio::test]
async fn test_diagnose_lists_questions_awaiting_import() {
    let (h, actor, request_id, ids) = approved_setup(3, 2).await;
    let report = h
        .orchestrator
        .diagnose(&actor, DiagnoseScope::Request(request_id))
        .await
        .unwrap();
    assert!(report.questions.is_empty());
    assert_eq!(report.awaiting_import.len(), 2);
    assert!(report.awaiting_import.contains(&ids[0]));
    assert_eq!(h.bank.rows_written(), 0);
}

#[tokio::test]
async fn test_reset_requires_admin() {
    let (h, actor, request_id, _) = approved_setup(1, 0).await;
    let err = h
        .orchestrator
        .reset_request(&actor, request_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
}

#[tokio::test]
async fn test_reset_clears_undeployed_request() {
    let (h, _, request_id, _) = approved_setup(2, 1).await;
    let admin = Actor::admin(1);

    let request = h
        .orchestrator
        .reset_request(&admin, request_id)
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert!(request.configuration.is_none());
    assert!(request.completed_at.is_none());

    let status = h
        .orchestrator
        .get_request_status(&admin, request_id)
        .await
        .unwrap();
    assert_eq!(status.topic_count, 0);
    assert!(status.question_counts.is_empty());
}

#[tokio::test]
async fn test_reset_refuses_deployed_request() {
    let (h, actor, request_id, _) = approved_setup(2, 1).await;
    h.orchestrator
        .deploy(&actor, request_id, category("Week 1"))
        .await
        .unwrap();

    let err = h
        .orchestrator
        .reset_request(&Actor::admin(1), request_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(h.repo.question_total(), 2);
}

#[tokio::test]
async fn test_reset_fails_stuck_request_first() {
    let (h, _, request_id, _) = approved_setup(1, 0).await;
    h.repo
        .force_status(request_id, RequestStatus::Generating)
        .unwrap();
    let mut events = h.orchestrator.events().subscribe();

    let request = h
        .orchestrator
        .reset_request(&Actor::admin(1), request_id)
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    let first = events.try_recv().unwrap();
    match first.payload {
        quizgen_orchestrator::OrchestratorEvent::RequestStatusChanged { to, error, .. } => {
            assert_eq!(to, RequestStatus::Failed);
            assert_eq!(error.as_deref(), Some("reset by administrator"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}
