//! Workflow properties against the in-memory forge.
//!
//! Each module pins one observable guarantee of `publish`: which calls are
//! made, where objects land, and how failures are reported.

use std::collections::BTreeMap;
use std::time::Duration;

use changeset_pr::auth::{Credential, DefaultCredential};
use changeset_pr::core::types::{ChangeSet, FileChange, RepositoryRef};
use changeset_pr::forge::mock::{ForkBehavior, Method, MockForge, MockOperation};
use changeset_pr::forge::ForgeError;
use changeset_pr::workflow::{
    publish, Deadline, ForkPollPolicy, Orchestrator, PublishError, PublishOptions, PublishOutcome,
    TimeoutError, WorkflowStep,
};
use proptest::prelude::*;

const BRANCH: &str = "optimize-all-services";

fn upstream() -> RepositoryRef {
    RepositoryRef::new("acme", "widgets")
}

fn service_credential() -> DefaultCredential {
    DefaultCredential::new(Some(Credential::new("ghs_service")))
}

fn dockerfile_changeset() -> ChangeSet {
    ChangeSet::builder(upstream())
        .change(FileChange::new(
            "Dockerfile",
            "FROM alpine:3.19\nRUN apk add --no-cache curl\n",
        ))
        .branch_name(BRANCH)
        .build()
}

fn methods(forge: &MockForge) -> Vec<Method> {
    forge.operations().iter().map(MockOperation::method).collect()
}

mod write_access {
    use super::*;

    fn file_changes() -> impl Strategy<Value = Vec<FileChange>> {
        prop::collection::btree_map("[a-z]{1,8}(/[a-z]{1,8}){0,2}", "[ -~]{0,40}", 1..6).prop_map(
            |files: BTreeMap<String, String>| {
                files
                    .into_iter()
                    .map(|(path, content)| FileChange::new(path, content))
                    .collect()
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn never_forks(changes in file_changes()) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let forge = MockForge::new();
            forge.add_repository(&upstream(), true);
            let expected: BTreeMap<String, String> = changes
                .iter()
                .map(|c| (c.path.clone(), c.content.clone()))
                .collect();
            let changeset = ChangeSet::builder(upstream()).changes(changes).build();

            let outcome = rt.block_on(publish(
                &forge,
                &service_credential(),
                changeset,
                PublishOptions::default(),
            ));

            prop_assert!(outcome.is_ok(), "publish failed: {:?}", outcome);
            prop_assert!(!methods(&forge).contains(&Method::CreateFork));
            prop_assert!(!methods(&forge).contains(&Method::AuthenticatedUser));
            let files = forge.files_at(&upstream(), BRANCH).unwrap();
            for (path, content) in &expected {
                prop_assert_eq!(files.get(path), Some(content));
            }
        }
    }

    #[tokio::test]
    async fn branch_and_pr_live_in_upstream() {
        let forge = MockForge::new();
        forge.add_repository(&upstream(), true);
        publish(&forge, &service_credential(), dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap();

        assert!(forge.branch_head(&upstream(), BRANCH).is_some());
        assert_eq!(forge.pr_head_label(1).as_deref(), Some("acme:optimize-all-services"));
    }
}

mod fork_path {
    use super::*;

    fn forking_forge(behavior: ForkBehavior) -> MockForge {
        let forge = MockForge::new()
            .with_login("octocat")
            .with_fork_behavior(behavior);
        forge.add_repository(&upstream(), false);
        forge
    }

    #[tokio::test(start_paused = true)]
    async fn pr_head_names_fork_owner_and_base_targets_upstream() {
        let forge = forking_forge(ForkBehavior {
            ready_after: 2,
            ..Default::default()
        });
        let fork = RepositoryRef::new("octocat", "widgets");

        let outcome = publish(&forge, &service_credential(), dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap();

        let prs = forge.pull_requests(&upstream());
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].base, "main");
        assert_eq!(forge.pr_head_label(prs[0].number).as_deref(), Some("octocat:optimize-all-services"));
        assert!(forge.pull_requests(&fork).is_empty());
        assert_eq!(outcome.url(), Some(prs[0].url.as_str()));

        assert!(forge.branch_head(&fork, BRANCH).is_some());
        assert!(forge.branch_head(&upstream(), BRANCH).is_none());
        assert!(forge.operations().iter().any(|op| matches!(
            op,
            MockOperation::CreatePr { repo, head, .. }
                if repo == &upstream() && head == "octocat:optimize-all-services"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn renamed_fork_is_addressed_by_its_real_name() {
        let forge = forking_forge(ForkBehavior {
            name: Some("widgets-1".into()),
            ..Default::default()
        });
        publish(&forge, &service_credential(), dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap();

        let fork = RepositoryRef::new("octocat", "widgets-1");
        assert!(forge.branch_head(&fork, BRANCH).is_some());
        assert_eq!(forge.pr_head_label(1).as_deref(), Some("octocat:optimize-all-services"));
    }

    #[tokio::test(start_paused = true)]
    async fn base_falls_back_to_upstream_ref() {
        let forge = forking_forge(ForkBehavior {
            copy_branches: false,
            ..Default::default()
        });
        let upstream_head = forge.branch_head(&upstream(), "main").unwrap();

        publish(&forge, &service_credential(), dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap();

        let fork = RepositoryRef::new("octocat", "widgets");
        let head = forge.branch_head(&fork, BRANCH).unwrap();
        assert_eq!(forge.commit(&head).unwrap().parents, vec![upstream_head]);
    }

    #[tokio::test]
    async fn empty_fork_builds_on_upstream_ref() {
        let forge = forking_forge(ForkBehavior {
            copy_branches: false,
            ..Default::default()
        });
        let upstream_head = forge.branch_head(&upstream(), "main").unwrap();
        // The first ref read is the fork's base lookup.
        forge.fail_times(
            Method::GetBranch,
            1,
            ForgeError::Conflict("Git Repository is empty.".into()),
        );

        let outcome = publish(&forge, &service_credential(), dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap();

        let fork = RepositoryRef::new("octocat", "widgets");
        let head = forge.branch_head(&fork, BRANCH).unwrap();
        assert_eq!(forge.commit(&head).unwrap().parents, vec![upstream_head]);
        assert!(matches!(outcome, PublishOutcome::Created { .. }));
    }

    #[tokio::test]
    async fn denied_fork_is_permission_error() {
        let forge = forking_forge(ForkBehavior::default());
        forge.fail_on(
            Method::CreateFork,
            ForgeError::PermissionDenied("forking is disabled".into()),
        );

        let failure = publish(&forge, &service_credential(), dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap_err();
        assert_eq!(failure.step, WorkflowStep::Fork);
        assert_eq!(failure.error_kind(), "PermissionError");
        assert!(!methods(&forge).contains(&Method::CreateTree));
    }
}

mod idempotence {
    use super::*;

    #[tokio::test]
    async fn rerun_leaves_ref_alone_and_reports_existing_pr() {
        let forge = MockForge::new();
        forge.add_repository(&upstream(), true);
        let default = service_credential();

        let first = publish(&forge, &default, dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap();
        let head = forge.branch_head(&upstream(), BRANCH).unwrap();
        forge.clear_operations();

        let second = publish(&forge, &default, dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap();

        assert_eq!(forge.branch_head(&upstream(), BRANCH), Some(head));
        let ops = methods(&forge);
        assert!(!ops.contains(&Method::CreateBranch));
        assert!(!ops.contains(&Method::UpdateBranch));
        match second {
            PublishOutcome::AlreadyUpToDate { url, message } => {
                assert_eq!(url.as_deref(), first.url());
                assert!(message.contains("already exists"));
            }
            other => panic!("expected AlreadyUpToDate, got {:?}", other),
        }
        assert_eq!(forge.pull_requests(&upstream()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rerun_through_existing_fork() {
        let forge = MockForge::new().with_login("octocat");
        forge.add_repository(&upstream(), false);
        let default = service_credential();

        publish(&forge, &default, dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap();
        let second = publish(&forge, &default, dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap();
        assert!(matches!(second, PublishOutcome::AlreadyUpToDate { .. }));
    }

    #[tokio::test]
    async fn changed_content_force_updates_branch() {
        let forge = MockForge::new();
        forge.add_repository(&upstream(), true);
        let default = service_credential();
        publish(&forge, &default, dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap();
        let before = forge.branch_head(&upstream(), BRANCH).unwrap();

        let changed = ChangeSet::builder(upstream())
            .change(FileChange::new("Dockerfile", "FROM alpine:3.20\n"))
            .build();
        let outcome = publish(&forge, &default, changed, PublishOptions::default())
            .await
            .unwrap();

        let after = forge.branch_head(&upstream(), BRANCH).unwrap();
        assert_ne!(before, after);
        assert!(forge.operations().iter().any(|op| matches!(
            op,
            MockOperation::UpdateBranch { force: true, .. }
        )));
        assert!(matches!(outcome, PublishOutcome::AlreadyUpToDate { .. }));
    }
}

mod tree_fidelity {
    use super::*;

    #[tokio::test]
    async fn untouched_files_are_inherited() {
        let forge = MockForge::new();
        forge.add_repository(&upstream(), true);
        let base = forge.seed_commit(&upstream(), "main", &[("a.txt", "alpha\n"), ("b.txt", "beta\n")]);
        let base_tree = forge.commit(&base).unwrap().tree;

        let changeset = ChangeSet::builder(upstream())
            .change(FileChange::new("b.txt", "BETA\n"))
            .build();
        publish(&forge, &service_credential(), changeset, PublishOptions::default())
            .await
            .unwrap();

        // Only b.txt is sent, layered on main's tree
        let tree_ops: Vec<_> = forge
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::CreateTree { base_tree, paths, .. } => Some((base_tree, paths)),
                _ => None,
            })
            .collect();
        assert_eq!(tree_ops, vec![(base_tree.clone(), vec!["b.txt".to_string()])]);

        let before = forge.tree_files(&base_tree).unwrap();
        let after = forge.files_at(&upstream(), BRANCH).unwrap();
        assert_eq!(after.get("a.txt"), before.get("a.txt"));
        assert_eq!(after.get("b.txt").map(String::as_str), Some("BETA\n"));
        let changed: Vec<_> = after
            .iter()
            .filter(|(path, content)| before.get(*path) != Some(*content))
            .map(|(path, _)| path.as_str())
            .collect();
        assert_eq!(changed, vec!["b.txt"]);

        let head = forge.branch_head(&upstream(), BRANCH).unwrap();
        assert_eq!(forge.commit(&head).unwrap().parents, vec![base]);
    }
}

mod local_rejection {
    use super::*;

    #[tokio::test]
    async fn duplicate_path_makes_no_remote_call() {
        let forge = MockForge::new();
        forge.add_repository(&upstream(), true);
        let changeset = ChangeSet::builder(upstream())
            .change(FileChange::new("Dockerfile", "FROM alpine\n"))
            .change(FileChange::new("Dockerfile", "FROM debian\n"))
            .build();

        let failure = publish(&forge, &service_credential(), changeset, PublishOptions::default())
            .await
            .unwrap_err();

        assert_eq!(failure.step, WorkflowStep::Validate);
        assert_eq!(failure.error_kind(), "ValidationError");
        assert!(forge.operations().is_empty());
        assert!(forge.connections().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_makes_no_remote_call() {
        let forge = MockForge::new();
        forge.add_repository(&upstream(), true);

        let failure = publish(&forge, &DefaultCredential::none(), dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap_err();

        assert_eq!(failure.step, WorkflowStep::ResolveCredential);
        assert_eq!(failure.error_kind(), "AuthError");
        assert!(forge.connections().is_empty());
    }
}

mod fork_timeout {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_exact_attempts_within_budget() {
        let forge = MockForge::new()
            .with_login("octocat")
            .with_fork_behavior(ForkBehavior {
                ready_after: u32::MAX,
                ..Default::default()
            });
        forge.add_repository(&upstream(), false);
        let policy = ForkPollPolicy {
            attempts: 4,
            interval: Duration::from_secs(3),
        };
        let options = PublishOptions {
            fork_poll: policy,
            deadline: Deadline::none(),
        };

        let start = tokio::time::Instant::now();
        let failure = publish(&forge, &service_credential(), dockerfile_changeset(), options)
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(failure.step, WorkflowStep::PollFork);
        assert_eq!(
            failure.error,
            PublishError::Timeout(TimeoutError::ForkNotReady { attempts: 4 })
        );
        let fork = RepositoryRef::new("octocat", "widgets");
        let lookups = forge
            .operations()
            .iter()
            .filter(|op| matches!(op, MockOperation::GetRepository { repo } if repo == &fork))
            .count();
        assert_eq!(lookups, 4);
        assert!(elapsed <= policy.max_wait(), "waited {:?}", elapsed);
        assert!(!methods(&forge).contains(&Method::CreateTree));
    }
}

mod end_to_end {
    use super::*;

    #[tokio::test]
    async fn acme_widgets_with_write_access() {
        let forge = MockForge::new();
        let main_head = forge.add_repository(&upstream(), true);

        let credential = service_credential();
        let mut orchestrator = Orchestrator::new(&forge, &credential);
        let outcome = orchestrator.publish(dockerfile_changeset()).await.unwrap();

        assert_eq!(
            methods(&forge),
            vec![
                Method::GetRepository,
                Method::GetBranch,
                Method::GetCommit,
                Method::CreateTree,
                Method::CreateCommit,
                Method::GetBranch,
                Method::CreateBranch,
                Method::CreatePr,
            ]
        );
        assert!(!orchestrator.visited(WorkflowStep::Fork));

        let head = forge.branch_head(&upstream(), BRANCH).unwrap();
        assert_eq!(forge.commit(&head).unwrap().parents, vec![main_head]);
        assert!(forge.operations().iter().any(|op| matches!(
            op,
            MockOperation::CreatePr { base, head, .. }
                if base == "main" && head == "optimize-all-services"
        )));

        match outcome {
            PublishOutcome::Created { url, number } => {
                assert_eq!(number, 1);
                assert_eq!(url, "https://github.com/acme/widgets/pull/1");
            }
            other => panic!("expected Created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn base_override_targets_named_branch() {
        let forge = MockForge::new();
        forge.add_repository(&upstream(), true);
        let develop = forge.seed_commit(&upstream(), "develop", &[("x", "1")]);

        let changeset = ChangeSet::builder(upstream())
            .change(FileChange::new("Dockerfile", "FROM alpine\n"))
            .base_branch(Some("develop".into()))
            .build();
        publish(&forge, &service_credential(), changeset, PublishOptions::default())
            .await
            .unwrap();

        assert_eq!(forge.pull_requests(&upstream())[0].base, "develop");
        let head = forge.branch_head(&upstream(), BRANCH).unwrap();
        assert_eq!(forge.commit(&head).unwrap().parents, vec![develop]);
    }
}

mod cancellation {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_run_between_calls() {
        let forge = MockForge::new().with_latency(Duration::from_secs(10));
        forge.add_repository(&upstream(), true);
        let options = PublishOptions {
            deadline: Deadline::after(Duration::from_secs(15)),
            ..Default::default()
        };

        let failure = publish(&forge, &service_credential(), dockerfile_changeset(), options)
            .await
            .unwrap_err();

        assert_eq!(failure.error, PublishError::Cancelled);
        assert_eq!(failure.error_kind(), "CancelledError");
        assert_eq!(failure.step, WorkflowStep::BuildTree);
        assert!(!methods(&forge).contains(&Method::CreatePr));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_fork_poll_short() {
        let forge = MockForge::new()
            .with_login("octocat")
            .with_fork_behavior(ForkBehavior {
                ready_after: u32::MAX,
                ..Default::default()
            });
        forge.add_repository(&upstream(), false);
        let options = PublishOptions {
            fork_poll: ForkPollPolicy {
                attempts: 10,
                interval: Duration::from_secs(5),
            },
            deadline: Deadline::after(Duration::from_secs(7)),
        };

        let start = tokio::time::Instant::now();
        let failure = publish(&forge, &service_credential(), dockerfile_changeset(), options)
            .await
            .unwrap_err();

        assert_eq!(failure.step, WorkflowStep::PollFork);
        assert_eq!(failure.error, PublishError::Cancelled);
        assert!(start.elapsed() <= Duration::from_secs(7));
    }
}

mod credentials {
    use super::*;

    #[tokio::test]
    async fn request_credential_overrides_default() {
        let forge = MockForge::new().accept_only(&["ghu_requester", "ghs_service"]);
        forge.add_repository(&upstream(), true);
        let changeset = ChangeSet::builder(upstream())
            .change(FileChange::new("Dockerfile", "FROM alpine\n"))
            .credential(Some(Credential::new("ghu_requester")))
            .build();

        publish(&forge, &service_credential(), changeset, PublishOptions::default())
            .await
            .unwrap();

        let used: Vec<_> = forge
            .connections()
            .iter()
            .map(|c| c.expose().to_string())
            .collect();
        assert_eq!(used, vec!["ghu_requester".to_string()]);
    }

    #[tokio::test]
    async fn rejected_credential_fails_at_permissions() {
        let forge = MockForge::new().accept_only(&["ghs_service"]);
        forge.add_repository(&upstream(), true);
        let changeset = ChangeSet::builder(upstream())
            .change(FileChange::new("Dockerfile", "FROM alpine\n"))
            .credential(Some(Credential::new("ghu_expired")))
            .build();

        let failure = publish(&forge, &service_credential(), changeset, PublishOptions::default())
            .await
            .unwrap_err();
        assert_eq!(failure.step, WorkflowStep::ResolvePermissions);
        assert_eq!(failure.error_kind(), "AuthError");
        assert!(!failure.to_string().contains("ghu_expired"));
    }
}

mod failure_reporting {
    use super::*;

    #[tokio::test]
    async fn protected_branch_is_conflict_at_upsert() {
        let forge = MockForge::new();
        forge.add_repository(&upstream(), true);
        forge.seed_commit(&upstream(), BRANCH, &[("x", "1")]);
        forge.fail_on(
            Method::UpdateBranch,
            ForgeError::ApiError {
                status: 422,
                message: "Protected branch update failed".into(),
            },
        );

        let failure = publish(&forge, &service_credential(), dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap_err();
        assert_eq!(failure.step, WorkflowStep::UpsertRef);
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            serde_json::json!({
                "errorKind": "ConflictError",
                "step": "upsert_ref",
                "message": "conflict: Protected branch update failed",
            })
        );
        assert!(!methods(&forge).contains(&Method::CreatePr));
    }

    #[tokio::test]
    async fn server_errors_are_transient_and_not_retried() {
        let forge = MockForge::new();
        forge.add_repository(&upstream(), true);
        forge.fail_times(
            Method::CreateTree,
            1,
            ForgeError::ApiError {
                status: 502,
                message: "GitHub server error: Bad Gateway".into(),
            },
        );

        let failure = publish(&forge, &service_credential(), dockerfile_changeset(), PublishOptions::default())
            .await
            .unwrap_err();
        assert_eq!(failure.step, WorkflowStep::BuildTree);
        assert!(failure.error.is_retryable());
        let attempts = methods(&forge)
            .into_iter()
            .filter(|m| *m == Method::CreateTree)
            .count();
        assert_eq!(attempts, 1);
    }
}
