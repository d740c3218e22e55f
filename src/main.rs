use anyhow::{bail, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tetl::{
    init_tracing_once, load_handle_list, GazetteerTrie, Job, KeywordUsersJob, MentionEdgeJob, TweetETL, TweetSummaryJob,
    UserStatsJob,
};

const DATA_ROOT: &str = "./data/decrypted";
const WORK_ROOT: &str = "./tetl_work";
const GAZETTEER_DIR: &str = "./gazetteers";
const OUT_DIR: &str = "./out";

/// Users whose mention graph is collected.
const USERS_FILE: &str = "./gazetteers/users.txt";
const EDGE_MIN_EACH_DIRECTION: i64 = 2;

const KEYWORDS: &[&str] = &["ebola", "liberia", "guinea", "sierraleone", "outbreak", "quarantine"];

fn gazetteer(name: &str) -> Result<GazetteerTrie> {
    let dir = Path::new(GAZETTEER_DIR);
    GazetteerTrie::load_or_build(&dir.join(format!("{name}.txt")), &dir.join(format!("{name}.trie.zst")))
}

fn main() -> Result<()> {
    init_tracing_once();
    let which = std::env::args().nth(1).unwrap_or_else(|| "users".to_string());
    let hw = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(8);

    fs::create_dir_all(WORK_ROOT)?;
    fs::create_dir_all(OUT_DIR)?;

    let job: Box<dyn Job> = match which.as_str() {
        "users" => Box::new(UserStatsJob::new(gazetteer("west_africa")?, gazetteer("other_places")?, gazetteer("crisislex")?)),
        "summaries" => Box::new(TweetSummaryJob::new(gazetteer("west_africa")?, gazetteer("crisislex")?)),
        "keywords" => Box::new(KeywordUsersJob::new(KEYWORDS)?),
        "edges" => {
            let users = load_handle_list(Path::new(USERS_FILE))?;
            Box::new(MentionEdgeJob::new(users, EDGE_MIN_EACH_DIRECTION).with_env_users())
        }
        other => bail!("unknown job {other:?}; expected users, summaries, edges or keywords"),
    };

    let out: PathBuf = Path::new(OUT_DIR).join(format!("{}.csv", job.name()));
    let report = TweetETL::new()
        .input_dir(DATA_ROOT)
        .work_dir(WORK_ROOT)
        .parallelism(hw)
        .file_concurrency(hw.min(8))
        .progress(true)
        .progress_label(format!("tetl {}", job.name()))
        .run_job(job.as_ref(), &out)?;

    println!(
        "{}: {} keys reduced, {} emitted -> {}",
        report.job,
        report.keys_reduced,
        report.emitted,
        report.output.display()
    );
    Ok(())
}
