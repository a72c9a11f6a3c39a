//! Output formatting module

use plantscan_types::{OutputFormat, PlantAssessment, Result};
use serde::Serialize;

/// One row of batch output
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<PlantAssessment>,
    /// Request-level failure (unreadable file, unknown image type)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn output_assessment(output_format: OutputFormat, assessment: &PlantAssessment) -> Result<()> {
    if output_format == OutputFormat::Json {
        let content = serde_json::to_string_pretty(assessment)?;
        println!("{}", content);
        return Ok(());
    }

    // Table format
    println!("\nPlant Assessment");
    println!("================");
    println!(
        "Species:         {}",
        assessment.species_identified.as_deref().unwrap_or("(not identified)")
    );
    println!("Native region:   {}", assessment.native_region);
    println!(
        "Invasive:        {}",
        if assessment.invasive_or_not { "Yes" } else { "No" }
    );
    if let Some(score) = assessment.confidence_score {
        println!("Confidence:      {:.0}%", score);
    }
    if let Some(ref reasoning) = assessment.confidence_reasoning {
        println!("\nConfidence reasoning:");
        println!("{}", reasoning);
    }

    if !assessment.invasive_effects.is_empty() {
        println!("\nInvasive effects:");
        println!("{}", assessment.invasive_effects);
    }

    if !assessment.native_alternatives.is_empty() {
        println!("\nNative alternatives:");
        for alt in &assessment.native_alternatives {
            if alt.scientific_name.is_empty() {
                print!("  - {}", alt.common_name);
            } else {
                print!("  - {} ({})", alt.common_name, alt.scientific_name);
            }
            if alt.characteristics.is_empty() {
                println!();
            } else {
                println!(": {}", alt.characteristics);
            }
        }
    }

    if !assessment.remove_instructions.is_empty() {
        println!("\nRemoval:");
        println!("{}", assessment.remove_instructions);
    }

    Ok(())
}

pub fn output_chat(output_format: OutputFormat, question: &str, reply: &str) -> Result<()> {
    if output_format == OutputFormat::Json {
        let content = serde_json::to_string_pretty(&serde_json::json!({
            "question": question,
            "reply": reply,
        }))?;
        println!("{}", content);
    } else {
        println!("{}", reply);
    }
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn entry_status(entry: &BatchEntry) -> (String, &'static str) {
    match (&entry.assessment, &entry.error) {
        (Some(a), _) if a.is_failure() => (
            a.species_identified.clone().unwrap_or_default(),
            "failed",
        ),
        (Some(a), _) if a.is_not_a_plant() => (a.species_identified.clone().unwrap_or_default(), "-"),
        (Some(a), _) => (
            a.species_identified
                .clone()
                .unwrap_or_else(|| "(not identified)".to_string()),
            if a.invasive_or_not { "INVASIVE" } else { "not invasive" },
        ),
        (None, Some(e)) => (e.clone(), "error"),
        (None, None) => (String::new(), "error"),
    }
}

pub fn output_batch(output_format: OutputFormat, entries: &[BatchEntry]) -> Result<()> {
    if output_format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    println!("\n{:<32} {:<40} {}", "Image", "Species", "Status");
    println!("{}", "-".repeat(86));
    for entry in entries {
        let (species, status) = entry_status(entry);
        println!(
            "{:<32} {:<40} {}",
            truncate(&entry.image, 32),
            truncate(&species, 40),
            status
        );
    }

    let invasive = entries
        .iter()
        .filter(|e| e.assessment.as_ref().is_some_and(|a| a.invasive_or_not))
        .count();
    let failed = entries
        .iter()
        .filter(|e| e.assessment.as_ref().map_or(true, |a| a.is_failure()))
        .count();
    println!(
        "\n{} images, {} invasive, {} failed",
        entries.len(),
        invasive,
        failed
    );
    Ok(())
}
