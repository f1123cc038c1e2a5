//! Drives full pipeline runs against in-memory fakes and a temporary
//! working tree.

use std::fs;
use std::path::{Path, PathBuf};

use prfix::clients::fakes::{
    FakeHost, RecordingVcs, ScriptedTransport, VcsOp, anthropic_body, sample_pull_request,
};
use prfix::config::{ArtifactPaths, PublicationMode, Task};
use prfix::contexts::{
    DirectiveKind, IssueRequest, Job, LlmClient, ModelSelection, Outcome, Pipeline,
    PipelineSettings,
};
use prfix::error::PipelineError;

const REVIEW: &str = "## BLOCKERS\n- handle the empty input case in parse()\n\
                      ## SUGGESTIONS\n- rename `tmp` to `buffer`\n\
                      ## SUMMARY\nLooks close.";

const TWO_FILES: &str = "<<<file:src/parse.rs>>>\npub fn parse() {}\n<<<endfile>>>\n\
                         <<<file:docs/notes.md>>>\n# Notes\n<<<endfile>>>\n\
                         <<<commands>>>\ncargo fmt\ncargo test\n<<<endcommands>>>";

fn settings(workdir: &Path, job: Job, dry_run: bool) -> PipelineSettings {
    let task = job.task();
    PipelineSettings {
        job,
        workdir: workdir.to_path_buf(),
        artifacts: ArtifactPaths::new(workdir.join(".prfix")),
        diff_cap: 150_000,
        identity: task.default_identity(),
        dry_run,
    }
}

fn review_job(kind: DirectiveKind, publication: PublicationMode) -> Job {
    Job::Review {
        kind,
        pr_number: 7,
        publication,
    }
}

fn run(
    settings: PipelineSettings,
    host: &FakeHost,
    vcs: &RecordingVcs,
    transport: &ScriptedTransport,
) -> Result<Outcome, PipelineError> {
    let llm = LlmClient::new(transport, ModelSelection::default(), 4096);
    Pipeline::new(settings, host, vcs, llm).run()
}

#[test]
fn blockers_are_applied_and_pushed_to_the_pr_branch() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new().with_diff("@@ -1 +1 @@\n-old\n+new\n");
    let transport = ScriptedTransport::replying(TWO_FILES);

    let outcome = run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap();

    assert_eq!(
        outcome,
        Outcome::Pushed {
            branch: "feature/work".to_string(),
            files: 2
        }
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("src/parse.rs")).unwrap(),
        "pub fn parse() {}"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("docs/notes.md")).unwrap(),
        "# Notes"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join(".prfix/commands.txt")).unwrap(),
        "cargo fmt\ncargo test"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join(".prfix/diff.patch")).unwrap(),
        "@@ -1 +1 @@\n-old\n+new\n"
    );

    assert_eq!(
        vcs.ops(),
        vec![
            VcsOp::Fetch("base000".to_string()),
            VcsOp::Fetch("head111".to_string()),
            VcsOp::Checkout {
                name: "feature/work".to_string(),
                at: "head111".to_string()
            },
            VcsOp::Diff {
                base: "base000".to_string(),
                head: "head111".to_string(),
                context_lines: 0
            },
            VcsOp::Identity {
                name: "ai-fixer".to_string(),
                email: "bot@users.noreply.github.com".to_string()
            },
            VcsOp::StageAll {
                exclude: vec![PathBuf::from(".prfix")]
            },
            VcsOp::Commit("AI: fix BLOCKERS for PR #7".to_string()),
            VcsOp::Push {
                branch: "feature/work".to_string(),
                set_upstream: false
            },
        ]
    );
    assert!(host.opened_pull_requests().is_empty());
    assert!(host.posted_comments().is_empty());
}

#[test]
fn prompt_carries_only_the_requested_section_and_the_diff() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new().with_diff("@@ -3 +3 @@\n-let tmp = 1;\n+let tmp = 2;\n");
    let transport = ScriptedTransport::replying(TWO_FILES);

    run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Suggestions, PublicationMode::DirectPush),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].prompt;
    assert!(prompt.contains("## SUGGESTIONS\n- rename `tmp` to `buffer`"));
    assert!(!prompt.contains("handle the empty input case"));
    assert!(!prompt.contains("Looks close."));
    assert!(prompt.contains("+let tmp = 2;"));
    assert!(prompt.contains("<<<file:relative/path>>>"));
    assert_eq!(requests[0].model, "claude-sonnet-4-20250514");
}

#[test]
fn the_most_recent_matching_comment_wins() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment("BLOCKERS\n- old request")
        .with_comment("BLOCKERS\n- newest request")
        .with_comment("LGTM after the fix");
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(TWO_FILES);

    run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap();

    let prompt = &transport.requests()[0].prompt;
    assert!(prompt.contains("- newest request"));
    assert!(!prompt.contains("- old request"));
}

#[test]
fn separate_pr_opens_follow_up_and_comments_on_the_original() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(TWO_FILES);

    let outcome = run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Suggestions, PublicationMode::BranchAndPr),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap();

    assert_eq!(
        outcome,
        Outcome::PullRequestOpened {
            branch: "auto/sugg-sc-7".to_string(),
            number: 100,
            url: "https://github.com/acme/widgets/pull/100".to_string(),
            files: 2,
        }
    );

    let ops = vcs.ops();
    let tail = &ops[ops.len() - 3..];
    assert_eq!(tail[0], VcsOp::Commit("AI: apply SUGGESTIONS for PR #7".to_string()));
    assert_eq!(tail[1], VcsOp::CreateBranch("auto/sugg-sc-7".to_string()));
    assert_eq!(
        tail[2],
        VcsOp::Push {
            branch: "auto/sugg-sc-7".to_string(),
            set_upstream: true
        }
    );

    let opened = host.opened_pull_requests();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].head, "auto/sugg-sc-7");
    assert_eq!(opened[0].base, "main");
    assert_eq!(opened[0].title, "AI: apply SUGGESTIONS for PR #7");
    assert!(opened[0].body.contains("`src/parse.rs`"));

    let posted = host.posted_comments();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].0, 7);
    assert!(posted[0].1.contains("#100"));
    let upper = posted[0].1.to_uppercase();
    assert!(!upper.contains("BLOCKERS"));
    assert!(!upper.contains("SUGGESTIONS"));
    assert_eq!(host.metadata_reads(), 0);
}

#[test]
fn empty_base_branch_falls_back_to_the_default_branch() {
    let dir = tempfile::tempdir().unwrap();
    let mut pr = sample_pull_request(7);
    pr.base_branch = String::new();
    let host = FakeHost::new()
        .with_pull_request(pr)
        .with_default_branch("develop")
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(TWO_FILES);

    run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::BranchAndPr),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap();

    let opened = host.opened_pull_requests();
    assert_eq!(opened[0].head, "auto/fix-blockers-7");
    assert_eq!(opened[0].base, "develop");
    assert_eq!(host.metadata_reads(), 1);
}

#[test]
fn missing_directive_is_a_clean_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment("## SUGGESTIONS\n- only suggestions here");
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(TWO_FILES);

    let outcome = run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap();

    assert_eq!(outcome, Outcome::EmptyDirective);
    assert!(transport.requests().is_empty());
    assert!(!vcs.mutated());
    assert!(!dir.path().join("src").exists());
}

#[test]
fn reply_without_blocks_is_saved_and_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new();
    let raw = "I could not find anything to change.";
    let transport = ScriptedTransport::replying(raw);

    let err = run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap_err();

    match err {
        PipelineError::NoBlocks { artifact } => {
            assert_eq!(artifact, dir.path().join(".prfix/llm_out.txt"));
            assert_eq!(fs::read_to_string(artifact).unwrap(), raw);
        }
        other => panic!("Expected NoBlocks, got {:?}", other),
    }
    assert!(!vcs.mutated());
    assert!(!dir.path().join(".prfix/commands.txt").exists());
}

#[test]
fn unknown_model_falls_back_once() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::new(vec![
        (404, r#"{"type":"error","error":{"type":"not_found_error"}}"#.to_string()),
        (200, anthropic_body(&["<<<file:a.txt>>>\n", "alpha\n<<<endfile>>>"])),
    ]);

    let outcome = run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap();

    assert_eq!(outcome.files_changed(), 1);
    assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "alpha");
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].model, "claude-3-5-sonnet-20241022");
    assert!(
        requests[1]
            .prompt
            .ends_with("(Using fallback: claude-3-5-sonnet-20241022)")
    );
}

#[test]
fn upstream_failure_stops_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::new(vec![(401, "invalid x-api-key".to_string())]);

    let err = run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::UpstreamApi { status: 401, .. }));
    assert_eq!(transport.requests().len(), 1);
    assert!(!vcs.mutated());
}

#[test]
fn unknown_pull_request_is_an_upstream_error() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new().with_pull_request(sample_pull_request(8));
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(TWO_FILES);

    let err = run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::UpstreamApi { status: 404, .. }));
    assert!(vcs.ops().is_empty());
}

#[test]
fn dry_run_writes_and_pushes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(TWO_FILES);

    let outcome = run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::BranchAndPr),
            true,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap();

    assert_eq!(
        outcome,
        Outcome::DryRun {
            planned: vec!["src/parse.rs".to_string(), "docs/notes.md".to_string()]
        }
    );
    assert!(!dir.path().join("src/parse.rs").exists());
    assert!(!dir.path().join(".prfix/commands.txt").exists());
    assert!(!vcs.mutated());
    assert!(host.opened_pull_requests().is_empty());
}

#[test]
fn escaping_path_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(
        "<<<file:ok.txt>>>\nfine\n<<<endfile>>>\n<<<file:../../etc/cron.d/x>>>\nbad\n<<<endfile>>>",
    );

    let err = run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::UnsafePath(ref p) if p == "../../etc/cron.d/x"));
    assert!(!dir.path().join("ok.txt").exists());
    assert!(!vcs.mutated());
}

#[test]
fn git_metadata_paths_abort_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(
        "<<<file:ok.txt>>>\nfine\n<<<endfile>>>\n<<<file:.git/hooks/pre-commit>>>\n#!/bin/sh\n<<<endfile>>>",
    );

    let err = run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::UnsafePath(ref p) if p == ".git/hooks/pre-commit"));
    assert!(!dir.path().join("ok.txt").exists());
    assert!(!dir.path().join(".git").exists());
    assert!(!vcs.mutated());
}

#[test]
fn artifacts_outside_the_work_tree_are_not_excluded_from_staging() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(TWO_FILES);

    let mut settings = settings(
        dir.path(),
        review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
        false,
    );
    settings.artifacts = ArtifactPaths::new(artifacts.path());

    let outcome = run(settings, &host, &vcs, &transport).unwrap();

    assert_eq!(outcome.files_changed(), 2);
    assert_eq!(
        fs::read_to_string(artifacts.path().join("commands.txt")).unwrap(),
        "cargo fmt\ncargo test"
    );
    assert!(artifacts.path().join("diff.patch").exists());
    assert!(!dir.path().join(".prfix").exists());
    assert!(vcs.ops().contains(&VcsOp::StageAll { exclude: vec![] }));
}

#[test]
fn nested_artifacts_dir_is_excluded_relative_to_the_work_tree() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(TWO_FILES);

    let mut settings = settings(
        dir.path(),
        review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
        false,
    );
    settings.artifacts = ArtifactPaths::new(dir.path().join("target/prfix"));

    run(settings, &host, &vcs, &transport).unwrap();

    assert!(vcs.ops().contains(&VcsOp::StageAll {
        exclude: vec![PathBuf::from("target/prfix")]
    }));
}

#[test]
fn failed_push_keeps_earlier_work() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let vcs = RecordingVcs::new().failing_on("push");
    let transport = ScriptedTransport::replying(TWO_FILES);

    let err = run(
        settings(
            dir.path(),
            review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
            false,
        ),
        &host,
        &vcs,
        &transport,
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::Vcs { ref command, .. } if command == "push"));
    assert!(dir.path().join("src/parse.rs").exists());
    assert!(
        vcs.ops()
            .contains(&VcsOp::Commit("AI: fix BLOCKERS for PR #7".to_string()))
    );
}

#[test]
fn oversized_diff_is_capped_in_the_prompt_but_kept_in_full() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new()
        .with_pull_request(sample_pull_request(7))
        .with_comment(REVIEW);
    let diff = format!("{}{}", "a".repeat(40), "Z".repeat(40));
    let vcs = RecordingVcs::new().with_diff(diff.clone());
    let transport = ScriptedTransport::replying(TWO_FILES);

    let mut run_settings = settings(
        dir.path(),
        review_job(DirectiveKind::Blockers, PublicationMode::DirectPush),
        false,
    );
    run_settings.diff_cap = 40;
    run(run_settings, &host, &vcs, &transport).unwrap();

    let prompt = &transport.requests()[0].prompt;
    assert!(prompt.contains(&"a".repeat(40)));
    assert!(!prompt.contains("ZZZZ"));
    assert!(prompt.contains("truncated to the first 40 of 80 characters"));
    assert_eq!(
        fs::read_to_string(dir.path().join(".prfix/diff.patch")).unwrap(),
        diff
    );
}

#[test]
fn issue_is_implemented_on_a_new_branch() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new().with_default_branch("trunk");
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(TWO_FILES);
    let issue = IssueRequest {
        number: 5,
        title: "Add health check".to_string(),
        body: "GET /health returns 200 with body ok".to_string(),
    };

    let outcome = run(
        settings(dir.path(), Job::Issue(issue), false),
        &host,
        &vcs,
        &transport,
    )
    .unwrap();

    assert!(matches!(
        outcome,
        Outcome::PullRequestOpened { ref branch, files: 2, .. } if branch == "auto/issue-5"
    ));
    assert_eq!(
        vcs.ops()[..2],
        [
            VcsOp::Fetch("trunk".to_string()),
            VcsOp::Checkout {
                name: "trunk".to_string(),
                at: "FETCH_HEAD".to_string()
            },
        ]
    );
    assert!(vcs.ops().contains(&VcsOp::Identity {
        name: "ai-implementer".to_string(),
        email: "bot@users.noreply.github.com".to_string()
    }));

    let opened = host.opened_pull_requests();
    assert_eq!(opened[0].base, "trunk");
    assert_eq!(opened[0].title, "AI: implement issue #5");
    assert_eq!(host.posted_comments()[0].0, 5);

    let prompt = &transport.requests()[0].prompt;
    assert!(prompt.contains("issue #5 (Add health check)"));
    assert!(prompt.ends_with("GET /health returns 200 with body ok"));
}

#[test]
fn issue_without_body_is_a_clean_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    let vcs = RecordingVcs::new();
    let transport = ScriptedTransport::replying(TWO_FILES);
    let issue = IssueRequest {
        number: 6,
        title: "Empty".to_string(),
        body: "  \n".to_string(),
    };

    let outcome = run(
        settings(dir.path(), Job::Issue(issue), false),
        &host,
        &vcs,
        &transport,
    )
    .unwrap();

    assert_eq!(outcome, Outcome::EmptyDirective);
    assert!(transport.requests().is_empty());
    assert!(vcs.ops().is_empty());
    assert_eq!(host.metadata_reads(), 0);
}

#[test]
fn committer_identity_follows_the_task() {
    assert_eq!(Task::ApplySuggestions.default_identity().name, "ai-suggester");
}
