mod config;
mod date;
mod paths;
mod zstd_jsonl;
mod kv_shard;

mod filters;
mod progress;
mod stitch;
mod concurrency;
mod counting;
mod util;
mod mem;
mod pipeline;

mod error;
mod tokens;
mod gazetteer;
mod matcher;
mod accumulate;
mod gate;
mod edge;
mod record;
mod combine;
mod jobs;

pub use crate::config::JobOptions;
pub use crate::date::DateWindow;
pub use crate::pipeline::{JobReport, TweetETL};
pub use crate::filters::{is_twitter_url, RecordFilter, Rejection};
pub use crate::counting::{CounterSnapshot, JobCounters};
pub use crate::paths::{discover_inputs, FileJob, FileKind};

// Gazetteers and phrase matching.
pub use crate::error::{GazetteerError, SchemaError};
pub use crate::gazetteer::{GazetteerBuilder, GazetteerLoadReport, GazetteerTrie, NodeId, Phrase};
pub use crate::matcher::{any_subsequence_matches, any_trie_matches, first_match};
pub use crate::tokens::{mentions, mentions_counted, normalize_token, normalize_tokens, Tokenizer, WhitespaceTokenizer};

// Aggregation.
pub use crate::accumulate::{Counter, FeatureVector, KeyedAccumulator};
pub use crate::gate::{ProvisionalTracker, ThresholdGate};
pub use crate::edge::{edge_key, edge_observation, split_edge_key, EDGE_SEPARATOR};
pub use crate::kv_shard::{ReduceOutcome, ShardedKVWriter};
pub use crate::combine::{Combiner, ProvisionalSink};

// Records and jobs.
pub use crate::record::{parse_record, RecordView, TweetRecord};
pub use crate::jobs::{
    name_matches_region, normalize_handle, tweet_summary, user_stats, Emission, Job, KeywordUsersJob, MentionEdgeJob,
    TweetSummaryJob, UserStatsJob,
};

// Expose multiprogress and memory helpers to binaries.
pub use crate::progress::{make_count_progress, set_global_multiprogress};
pub use crate::mem::{available_memory_fraction, is_low_memory};

pub use crate::util::{init_tracing_once, load_handle_list, merge_extra_users, EXTRA_USERS_ENV};
pub use crate::util::{create_with_backoff, open_with_backoff, remove_with_backoff, replace_file_atomic_backoff};
