use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{info, warn};

use docbot::ChatService;
use docbot::model::{
    CategoryScores, ChatRequest, EvaluationCase, EvaluationReport, EvaluationResult, ScoreSummary,
};
use docbot::util::{now_utc_string, sibling_path, write_json_pretty_atomic};

use crate::cli::EvaluateArgs;

const UNCATEGORIZED: &str = "uncategorized";

pub fn run(args: EvaluateArgs) -> Result<()> {
    let raw = fs::read(&args.dataset)
        .with_context(|| format!("failed to read {}", args.dataset.display()))?;
    let cases: Vec<EvaluationCase> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", args.dataset.display()))?;
    if cases.is_empty() {
        bail!("evaluation dataset {} has no cases", args.dataset.display());
    }

    let config = args.service.to_config();
    let service = ChatService::from_config(&config).context("failed to start chat service")?;
    let cleaner = ReplyCleaner::new()?;
    let report_path = args
        .report_path
        .clone()
        .unwrap_or_else(|| sibling_path(&args.dataset, ".report.json"));

    info!(
        dataset = %args.dataset.display(),
        cases = cases.len(),
        index_path = %config.index_path.display(),
        "evaluation started"
    );

    let results = evaluate_cases(&service, &cleaner, cases);
    let report = build_report(
        &args.dataset,
        &config.index_path,
        now_utc_string(),
        results,
    );
    write_json_pretty_atomic(&report_path, &report)
        .with_context(|| format!("failed to write {}", report_path.display()))?;

    info!(
        cases = report.case_count,
        failed = report.failed_cases,
        mean_word_overlap = report.word_overlap.mean,
        mean_bleu = report.bleu.mean,
        report = %report_path.display(),
        "evaluation completed"
    );
    Ok(())
}

fn evaluate_cases(
    service: &ChatService,
    cleaner: &ReplyCleaner,
    cases: Vec<EvaluationCase>,
) -> Vec<EvaluationResult> {
    let mut results = Vec::with_capacity(cases.len());

    for (position, case) in cases.into_iter().enumerate() {
        let label = case.id.clone().unwrap_or_else(|| format!("#{}", position + 1));
        let request = ChatRequest {
            message: case.question.clone(),
            session_id: Some(format!("evaluate-{label}")),
            history: Vec::new(),
        };

        let (reply, mode, error, overlap, bleu) = match service.respond(&request) {
            Ok(response) => {
                if response.degraded {
                    warn!(case = %label, "case answered with degraded retrieval");
                }
                let scored = cleaner.clean(&response.reply);
                let overlap = word_overlap(&scored, &case.expected_answer);
                let bleu = unigram_bleu(&scored, &case.expected_answer);
                info!(
                    case = %label,
                    mode = response.mode.as_str(),
                    word_overlap = overlap,
                    bleu,
                    "case scored"
                );
                (response.reply, Some(response.mode), None, overlap, bleu)
            }
            Err(err) => {
                let body = err.to_body();
                warn!(case = %label, kind = body.kind, error = %body.message, "case failed");
                (body.message, None, Some(body.kind.to_string()), 0.0, 0.0)
            }
        };

        results.push(EvaluationResult {
            id: case.id,
            category: case.category,
            question: case.question,
            expected_answer: case.expected_answer,
            reply,
            mode,
            error,
            word_overlap: overlap,
            bleu,
        });
    }

    results
}

struct ReplyCleaner {
    template_header: Regex,
    no_context: Regex,
    ellipsis: Regex,
    whitespace: Regex,
}

impl ReplyCleaner {
    fn new() -> Result<Self> {
        Ok(Self {
            template_header: Regex::new(r"(?i)here's what the [^\n]*? documentation says:")
                .context("invalid template header pattern")?,
            no_context: Regex::new(
                r"(?i)no relevant information found in the [^\n]*? documentation for this question\.(\s*try rephrasing it, or create a support ticket so the team can follow up\.)?",
            )
            .context("invalid no-context pattern")?,
            ellipsis: Regex::new(r"\.\.\.|…").context("invalid ellipsis pattern")?,
            whitespace: Regex::new(r"\s+").context("invalid whitespace pattern")?,
        })
    }

    fn clean(&self, reply: &str) -> String {
        let text = self.template_header.replace_all(reply, " ");
        let text = self.no_context.replace_all(&text, " ");
        let text = self.ellipsis.replace_all(&text, " ");
        self.whitespace.replace_all(&text, " ").trim().to_string()
    }
}

fn build_report(
    dataset: &Path,
    index_path: &Path,
    generated_at: String,
    results: Vec<EvaluationResult>,
) -> EvaluationReport {
    let mut grouped = BTreeMap::<String, Vec<&EvaluationResult>>::new();
    for result in &results {
        let category = result
            .category
            .clone()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        grouped.entry(category).or_default().push(result);
    }

    let categories = grouped
        .into_iter()
        .map(|(category, members)| CategoryScores {
            count: members.len(),
            word_overlap: summarize(members.iter().map(|result| result.word_overlap)),
            bleu: summarize(members.iter().map(|result| result.bleu)),
            category,
        })
        .collect();

    EvaluationReport {
        generated_at,
        dataset_path: dataset.display().to_string(),
        index_path: index_path.display().to_string(),
        case_count: results.len(),
        failed_cases: results.iter().filter(|result| result.error.is_some()).count(),
        word_overlap: summarize(results.iter().map(|result| result.word_overlap)),
        bleu: summarize(results.iter().map(|result| result.bleu)),
        categories,
        results,
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().map(str::to_lowercase)
}

fn word_overlap(candidate: &str, reference: &str) -> f64 {
    let candidate = words(candidate).collect::<HashSet<_>>();
    let reference = words(reference).collect::<HashSet<_>>();
    if candidate.is_empty() || reference.is_empty() {
        return 0.0;
    }

    let shared = candidate.intersection(&reference).count();
    let union = candidate.union(&reference).count();
    shared as f64 / union as f64
}

fn unigram_bleu(candidate: &str, reference: &str) -> f64 {
    let candidate = words(candidate).collect::<Vec<_>>();
    let mut remaining = HashMap::<String, usize>::new();
    for word in words(reference) {
        *remaining.entry(word).or_default() += 1;
    }
    if candidate.is_empty() || remaining.is_empty() {
        return 0.0;
    }

    let mut matches = 0usize;
    for word in &candidate {
        if let Some(count) = remaining.get_mut(word)
            && *count > 0
        {
            *count -= 1;
            matches += 1;
        }
    }
    matches as f64 / candidate.len() as f64
}

fn summarize(values: impl Iterator<Item = f64>) -> ScoreSummary {
    let values = values.collect::<Vec<_>>();
    if values.is_empty() {
        return ScoreSummary::default();
    }

    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let std = if values.len() > 1 {
        let squares = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>();
        (squares / (count - 1.0)).sqrt()
    } else {
        0.0
    };

    ScoreSummary {
        mean,
        std,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}
