#[path = "common/mod.rs"]
mod common;

use common::*;
use serde_json::json;
use std::path::Path;
use tetl::{
    Emission, FeatureVector, GazetteerTrie, Job, KeywordUsersJob, MentionEdgeJob, RecordFilter, RecordView,
    TweetETL, TweetSummaryJob, UserStatsJob,
};

fn etl(input: &Path, work: &Path) -> TweetETL {
    TweetETL::new()
        .input_dir(input)
        .work_dir(work)
        .progress(false)
        .shard_count(4)
        .file_concurrency(2)
}

fn edge_job() -> MentionEdgeJob {
    MentionEdgeJob::new(["alice", "dave"], 2)
}

/// Mentions in both directions, spread over a plain and a zstd file, reduce
/// to the canonical edge with both counts; edges below the gate are dropped.
#[test]
fn mention_edges_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    make_mention_corpus(&input);
    let out = dir.path().join("out").join("edges.csv");

    let work = dir.path().join("work");
    let report = etl(&input, &work).run_job(&edge_job(), &out).unwrap();

    assert_eq!(read_lines(&out), vec!["alice@bob,2,2".to_string()]);
    assert!(!work.join("edges_job").exists(), "job work dir is cleaned up");
    assert_eq!(report.files_planned, 2);
    assert_eq!(report.counters.files_read, 2);
    assert_eq!(report.counters.records_read, 6);
    assert_eq!(report.counters.records_mapped, 6);
    assert_eq!(report.counters.vectors_emitted, 6);
    assert_eq!(report.keys_reduced, 3);
    assert_eq!(report.emitted, 1);
}

/// The final output does not depend on how often the combiner ran: with a
/// one-key buffer every emission is shuffled on its own, with a large buffer
/// each file is fully combined first.
#[test]
fn combine_grouping_does_not_change_totals() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    make_mention_corpus(&input);

    let fine = dir.path().join("fine.csv");
    let coarse = dir.path().join("coarse.csv");
    let r1 = etl(&input, &dir.path().join("w1"))
        .combine_buffer_keys(1)
        .run_job(&edge_job(), &fine)
        .unwrap();
    let r2 = etl(&input, &dir.path().join("w2"))
        .combine_buffer_keys(1_000)
        .file_concurrency(1)
        .run_job(&edge_job(), &coarse)
        .unwrap();

    assert_eq!(read_output(&fine), read_output(&coarse));
    assert_eq!(read_output(&fine).get("alice@bob"), Some(&vec![2, 2]));
    // Every emission shuffled alone vs. one partial per key per file.
    assert_eq!(r1.partials_shuffled, 6);
    assert_eq!(r2.partials_shuffled, 4);
}

/// Provisional signals fire only where a local partial already passes the
/// gate; they never contradict the final result.
#[test]
fn provisional_results_are_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    // Both directions twice, all in one file: the combiner sees a passing partial.
    write_lines(
        &input.join("2014-07-01").join("one.jsonl"),
        &[
            mention("alice", &["bob", "bob"]),
            mention("bob", &["alice"]),
            mention("bob", &["alice"]),
            mention("alice", &["bob"]),
        ],
    );
    let out = dir.path().join("edges.csv");
    let report = etl(&input, &dir.path().join("work")).run_job(&edge_job(), &out).unwrap();

    assert_eq!(report.counters.provisional, 1);
    assert_eq!(read_lines(&report.provisional_output), vec!["alice@bob,2,2".to_string()]);
    assert_eq!(read_output(&out).get("alice@bob"), Some(&vec![3, 2]));

    // Without combining no partial ever reaches the gate locally.
    let out2 = dir.path().join("edges2.csv");
    let report2 = etl(&input, &dir.path().join("work2"))
        .combine_buffer_keys(1)
        .run_job(&edge_job(), &out2)
        .unwrap();
    assert_eq!(report2.counters.provisional, 0);
    assert!(read_lines(&report2.provisional_output).is_empty());
    assert_eq!(read_output(&out2), read_output(&out));
}

/// Filter counters: malformed lines, spam, foreign links, out-of-window
/// records and whole crawl-day directories outside the window.
#[test]
fn record_and_file_gates_are_counted() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    let good = tweet("alice", "2014-06-01T08:00:00Z", &["ebola"]);
    let spam = json!({"author": "s", "published": "2014-06-01T08:00:00Z", "spam_probability": 0.9, "tokens": ["ebola"]});
    let foreign = json!({"author": "f", "published": "2014-06-01T08:00:00Z", "url": "http://blog.example/x", "tokens": ["ebola"]});
    let old = tweet("o", "2013-06-01T08:00:00Z", &["ebola"]);
    write_lines(
        &input.join("2014-06-01").join("a.jsonl"),
        &[good.clone(), "{not json".to_string(), spam.to_string(), foreign.to_string(), old, String::new()],
    );
    write_lines(&input.join("2013-01-05").join("skipped.jsonl"), &[good.clone()]);
    write_lines(&input.join("notes.txt"), &["ignored"]);

    let job = KeywordUsersJob::new(["ebola"]).unwrap();
    let out = dir.path().join("kw.csv");
    let report = etl(&input, &dir.path().join("work")).run_job(&job, &out).unwrap();

    let c = report.counters;
    assert_eq!(report.files_planned, 2);
    assert_eq!(c.files_date_invalid, 1);
    assert_eq!(c.files_read, 1);
    assert_eq!(c.records_read, 5);
    assert_eq!(c.records_malformed, 1);
    assert_eq!(c.records_spam, 1);
    assert_eq!(c.records_foreign_url, 1);
    assert_eq!(c.records_out_of_window, 1);
    assert_eq!(c.records_mapped, 1);
    assert_eq!(read_lines(&out), vec!["alice,1,1".to_string()]);
}

/// Keyword totals are exact; authors who never used a keyword are dropped at
/// the end, whatever the combine grouping.
#[test]
fn keyword_users_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    write_lines(
        &input.join("a.ndjson"),
        &[
            tweet("amy", "2014-03-01T10:00:00Z", &["#Ebola", "outbreak"]),
            tweet("amy", "2014-03-02T10:00:00Z", &["nothing"]),
            tweet("ben", "2014-03-02T10:00:00Z", &["nothing", "here"]),
        ],
    );
    write_zst_lines(&input.join("b.zst"), &[tweet("amy", "2014-03-03T10:00:00Z", &["ebola"])]);

    let job = KeywordUsersJob::new(["ebola", "outbreak"]).unwrap();
    for keys in [1, 100] {
        let out = dir.path().join(format!("kw_{keys}.csv"));
        etl(&input, &dir.path().join(format!("work_{keys}")))
            .combine_buffer_keys(keys)
            .run_job(&job, &out)
            .unwrap();
        let got = read_output(&out);
        assert_eq!(got.len(), 1, "grouping {keys}");
        assert_eq!(got.get("amy"), Some(&vec![3, 2, 1]));
    }
}

/// User statistics over gazetteer matches, with the mean time of day in the output.
#[test]
fn user_stats_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let gaz = dir.path().join("gaz");
    write_gazetteer(&gaz.join("wa.txt"), &["west africa", "monrovia,freetown"]);
    let west_africa = GazetteerTrie::load_or_build(&gaz.join("wa.txt"), &gaz.join("wa.trie.zst")).unwrap();
    let job = UserStatsJob::new(west_africa, GazetteerTrie::default(), GazetteerTrie::default());

    let input = dir.path().join("in");
    write_lines(
        &input.join("x.jsonl"),
        &[
            tweet_named("kofi", "Kofi, Liberia", "2014-09-01T06:00:00Z", &["hello", "monrovia"]),
            tweet_named("kofi", "Kofi, Liberia", "2014-09-02T10:00:01Z", &["#Ebola", "in", "west", "africa"]),
            tweet_named("zoe", "Zoe", "2014-09-02T10:00:00Z", &["west", "africa"]),
        ],
    );
    let out = dir.path().join("users.csv");
    etl(&input, &dir.path().join("work")).run_job(&job, &out).unwrap();

    // (06:00:00 + 10:00:01) / 2 = 08:00:00.5
    assert_eq!(read_lines(&out), vec!["kofi,2,1,2,0,0,1,28800.5,2".to_string()]);
}

/// Per-author category counts are the same whatever the combine grouping.
#[test]
fn tweet_summaries_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let gaz = dir.path().join("gaz");
    write_gazetteer(&gaz.join("wa.txt"), &["west africa"]);
    write_gazetteer(&gaz.join("lex.txt"), &["death toll"]);
    let job = TweetSummaryJob::new(
        GazetteerTrie::load_or_build(&gaz.join("wa.txt"), &gaz.join("wa.trie.zst")).unwrap(),
        GazetteerTrie::load_or_build(&gaz.join("lex.txt"), &gaz.join("lex.trie.zst")).unwrap(),
    );

    let input = dir.path().join("in");
    write_lines(
        &input.join("2014-05-01").join("a.jsonl"),
        &[
            tweet("ama", "2014-05-01T09:00:00Z", &["ebola", "in", "west", "africa"]),
            tweet("ama", "2014-05-01T10:00:00Z", &["hello"]),
            tweet("kwesi", "2014-05-01T11:00:00Z", &["death", "toll"]),
        ],
    );
    write_zst_lines(
        &input.join("2014-05-02").join("b.zst"),
        &[
            tweet("ama", "2014-05-02T09:00:00Z", &["#Ebola", "west", "africa"]),
            tweet("ama", "2014-05-02T12:00:00Z", &["ebola", "death", "toll", "west", "africa"]),
        ],
    );

    let mut outputs = Vec::new();
    for keys in [1, 100] {
        let out = dir.path().join(format!("sum_{keys}.csv"));
        etl(&input, &dir.path().join(format!("work_{keys}")))
            .combine_buffer_keys(keys)
            .run_job(&job, &out)
            .unwrap();
        outputs.push(read_output(&out));
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0].get("ama"), Some(&vec![0, 0, 2, 0, 0, 1, 1, 0]));
    assert_eq!(outputs[0].get("kwesi"), Some(&vec![0, 0, 0, 0, 0, 0, 0, 1]));
}

/// Counts posts per author but cannot extract features from posts that
/// contain the token `boom`.
struct FailsOnBoom;

impl Job for FailsOnBoom {
    fn name(&self) -> &str {
        "fails_on_boom"
    }

    fn width(&self) -> usize {
        1
    }

    fn map(&self, rec: &RecordView<'_>) -> anyhow::Result<Vec<Emission>> {
        if rec.has_token("boom") {
            anyhow::bail!("cannot extract features");
        }
        Ok(vec![(rec.author.clone(), FeatureVector::new(vec![1]))])
    }

    fn finalize(&self, _key: &str, total: FeatureVector<i64>) -> Option<String> {
        Some(total.to_csv())
    }
}

/// A record whose extraction fails is counted and skipped; the rest of that
/// author's records and other authors still reduce to exact totals.
#[test]
fn extraction_failure_is_isolated_to_its_record() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    write_lines(
        &input.join("a.jsonl"),
        &[
            tweet("alice", "2014-06-01T08:00:00Z", &["ok"]),
            tweet("alice", "2014-06-01T09:00:00Z", &["boom"]),
            tweet("bob", "2014-06-01T10:00:00Z", &["ok"]),
        ],
    );
    write_zst_lines(&input.join("b.zst"), &[tweet("alice", "2014-06-02T08:00:00Z", &["fine"])]);

    let out = dir.path().join("flaky.csv");
    let report = etl(&input, &dir.path().join("work")).run_job(&FailsOnBoom, &out).unwrap();

    assert_eq!(report.counters.records_read, 4);
    assert_eq!(report.counters.extract_failed, 1);
    assert_eq!(report.counters.records_mapped, 3);
    let got = read_output(&out);
    assert_eq!(got.get("alice"), Some(&vec![2]));
    assert_eq!(got.get("bob"), Some(&vec![1]));
}

/// With a single shard the whole output is key-sorted.
#[test]
fn output_sorted_within_shards() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    let lines: Vec<String> = (0..40)
        .map(|i| tweet(&format!("user{i:02}"), "2014-04-04T04:04:04Z", &["ebola"]))
        .collect();
    write_lines(&input.join("many.jsonl"), &lines);

    let job = KeywordUsersJob::new(["ebola"]).unwrap();
    let out = dir.path().join("kw.csv");
    let report = etl(&input, &dir.path().join("work")).shard_count(1).run_job(&job, &out).unwrap();
    assert_eq!(report.emitted, 40);

    let keys: Vec<String> = read_lines(&out).iter().map(|l| l.split(',').next().unwrap().to_string()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

/// A truncated `.zst` file keeps the lines decoded before the damage and
/// does not fail the job.
#[test]
fn truncated_zst_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    let good = input.join("good.zst");
    let lines: Vec<String> = (0..50).map(|_| mention("alice", &["bob"])).collect();
    write_zst_lines(&good, &lines);
    let bytes = std::fs::read(&good).unwrap();
    std::fs::write(input.join("bad.zst"), &bytes[..bytes.len() / 2]).unwrap();

    let out = dir.path().join("edges.csv");
    let report = etl(&input, &dir.path().join("work"))
        .record_filter(RecordFilter::permissive())
        .run_job(&edge_job(), &out)
        .unwrap();
    assert_eq!(report.counters.files_read, 2);
    assert_eq!(report.counters.files_truncated, 1);
    assert!(out.exists());
}
