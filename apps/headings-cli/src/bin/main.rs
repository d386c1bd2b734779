use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use headings_cli::{init_tracing, read_topics, AppContext};
use headings_core::{AuthorityCandidate, Role, TopicCandidate, VocabularyCode};
use headings_marc::{attach_explanation, mnemonic, to_marc_json, SubjectFieldBuilder};
use headings_match::{merge_calibrated, AuthorityMatcher, MatchOptions, TopicMatches};

#[derive(Parser, Debug)]
#[command(name = "headings", about = "Match topics to controlled-vocabulary headings and build subject fields")]
struct Cli {
    /// Build an in-memory store from vocabulary .jsonl files instead of opening LanceDB
    #[arg(long, global = true)]
    vocab_dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct TopicArgs {
    /// Topic texts
    topics: Vec<String>,

    /// Role hint applied to the topics given on the command line
    #[arg(long, default_value = "topical")]
    role: Role,

    /// JSON array of {"topic", "type"} objects, appended to the positional topics
    #[arg(long)]
    input: Option<PathBuf>,

    /// Vocabulary to query (repeatable); defaults to matcher.vocabularies
    #[arg(long = "vocab")]
    vocabularies: Vec<String>,

    /// Candidates per vocabulary
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long)]
    min_score: Option<f32>,
}

impl TopicArgs {
    fn topics(&self) -> Result<Vec<TopicCandidate>> {
        let mut topics: Vec<TopicCandidate> = self.topics.iter().map(|t| TopicCandidate::new(t, self.role)).collect();
        if let Some(path) = &self.input {
            topics.extend(read_topics(path)?);
        }
        if topics.is_empty() {
            bail!("no topics given");
        }
        Ok(topics)
    }

    fn options(&self, defaults: &MatchOptions) -> Result<MatchOptions> {
        let mut options = defaults.clone();
        if !self.vocabularies.is_empty() {
            options.vocabularies = self.vocabularies.iter().map(VocabularyCode::new).collect::<Result<_, _>>()?;
        }
        if let Some(limit) = self.limit {
            options.per_vocab_limit = limit;
        }
        if let Some(min_score) = self.min_score {
            options.min_score = min_score;
        }
        Ok(options)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ranked candidates per vocabulary for each topic
    Match {
        #[command(flatten)]
        args: TopicArgs,

        /// Also print one list merged by calibrated score ([calibration] in config)
        #[arg(long, default_value_t = false)]
        merged: bool,
    },
    /// Build one subject field from an accepted heading
    Build {
        #[arg(long)]
        label: String,

        #[arg(long, default_value = "")]
        identifier: String,

        #[arg(long = "vocab", default_value = "lcsh")]
        vocabulary: String,

        #[arg(long, default_value = "topical")]
        role: Role,

        #[arg(long, default_value_t = 1.0)]
        score: f32,

        /// Topic the heading was accepted for, used for the explanation
        #[arg(long)]
        topic: Option<String>,

        #[arg(long, default_value_t = false)]
        explain: bool,
    },
    /// Match topics and build fields for the best candidates
    Suggest {
        #[command(flatten)]
        args: TopicArgs,

        #[arg(long, default_value_t = 1)]
        max_per_topic: usize,

        #[arg(long, default_value_t = false)]
        explain: bool,
    },
    /// Indexed entry counts per configured vocabulary
    Stats,
}

async fn matcher(ctx: &AppContext, vocab_dir: Option<&std::path::Path>) -> Result<AuthorityMatcher> {
    let embedder = ctx.embedder()?;
    let store = ctx.store(vocab_dir, embedder.as_ref()).await?;
    Ok(AuthorityMatcher::from_settings(&ctx.settings, embedder, store)?)
}

fn print_matches(matches: &TopicMatches) {
    println!("Topic: {} ({})", matches.topic.text, matches.topic.role_hint);
    for group in &matches.groups {
        if group.unavailable {
            println!("  [{}] unavailable", group.vocabulary);
            continue;
        }
        if group.candidates.is_empty() {
            println!("  [{}] no match", group.vocabulary);
        }
        for c in &group.candidates {
            println!("  [{}] {:.3}  {}  {}", group.vocabulary, c.score, c.label, c.identifier);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let ctx = AppContext::load().map_err(|e| {
        eprintln!("Error loading config: {e:#}");
        e
    })?;

    match cli.command {
        Command::Match { args, merged } => {
            let matcher = matcher(&ctx, cli.vocab_dir.as_deref()).await?;
            let options = args.options(matcher.defaults())?;
            let results = matcher.match_topics(&args.topics()?, &options).await?;
            let calibrations = if merged { ctx.calibrations()? } else { Default::default() };
            if merged && calibrations.is_empty() {
                eprintln!("No [calibration] table configured; skipping the merged list");
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for matches in &results {
                    print_matches(matches);
                    if !calibrations.is_empty() {
                        println!("  merged:");
                        for c in merge_calibrated(matches, &calibrations) {
                            println!(
                                "    {:.3}  [{}] {}",
                                c.calibrated_score, c.candidate.vocabulary_code, c.candidate.label
                            );
                        }
                    }
                }
            }
        }
        Command::Build { label, identifier, vocabulary, role, score, topic, explain } => {
            let registry = Arc::new(ctx.settings.registry()?);
            let builder = SubjectFieldBuilder::new(registry);
            let candidate = AuthorityCandidate {
                label,
                identifier,
                vocabulary_code: VocabularyCode::new(&vocabulary)?,
                // The entry's own role is unknown here; `role` only picks the field tag.
                role: None,
                score,
            };
            let mut field = builder.build(&candidate, role)?;
            if explain {
                let explainer = ctx.explainer()?;
                let topic = topic.as_deref().unwrap_or(&candidate.label);
                field = attach_explanation(field, topic, &candidate, explainer.as_ref(), ctx.settings.explanation.timeout())
                    .await;
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&to_marc_json(&field))?);
            } else {
                println!("{}", mnemonic(&field));
                if !field.explanation.is_empty() {
                    println!("  {}", field.explanation);
                }
            }
        }
        Command::Suggest { args, max_per_topic, explain } => {
            let matcher = matcher(&ctx, cli.vocab_dir.as_deref()).await?;
            let options = args.options(matcher.defaults())?;
            let results = matcher.match_topics(&args.topics()?, &options).await?;
            let builder = SubjectFieldBuilder::new(Arc::new(ctx.settings.registry()?));
            let mut report = builder.build_from_matches(&results, max_per_topic);
            if explain {
                let explainer = ctx.explainer()?;
                let timeout = ctx.settings.explanation.timeout();
                for built in &mut report.fields {
                    built.field = attach_explanation(
                        built.field.clone(),
                        &built.topic.text,
                        &built.candidate,
                        explainer.as_ref(),
                        timeout,
                    )
                    .await;
                }
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for built in &report.fields {
                    println!("{}", mnemonic(&built.field));
                    if !built.field.explanation.is_empty() {
                        println!("  {}", built.field.explanation);
                    }
                }
                for rejected in &report.rejected {
                    eprintln!("⚠️  skipped '{}' for '{}': {}", rejected.candidate.label, rejected.topic.text, rejected.reason);
                }
                println!("\n📊 {} fields for {} topics", report.fields.len(), results.len());
            }
        }
        Command::Stats => {
            let embedder = ctx.embedder()?;
            let store = ctx.store(cli.vocab_dir.as_deref(), embedder.as_ref()).await?;
            println!("Vocabulary store: {}", ctx.lancedb_path().display());
            for code in ctx.settings.matcher.vocabulary_codes()? {
                let count = store.count(&code).await?;
                println!("  {code}: {count} entries");
            }
        }
    }
    Ok(())
}
