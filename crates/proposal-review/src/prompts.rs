//! Prompt assembly for each analysis stage.
//!
//! A prompt is the stage's instructions, the proposal text, the outputs of
//! the stage's inputs and any extra input the user supplied. Context inputs
//! that have not run appear as "Not performed".

use std::fmt::Write as _;

use crate::cache::AnalysisCache;
use crate::document::Document;
use crate::stage::{StageDefinition, StageId, StageRegistry};

pub const NOT_PERFORMED: &str = "Not performed";

/// Components every proposal is checked for, in report order.
pub const STANDARD_COMPONENTS: [&str; 14] = [
    "Executive Summary / Project Overview",
    "Scope of Work (In Scope)",
    "Out of Scope",
    "Prerequisites / Requirements",
    "Deliverables",
    "Timeline / Schedule",
    "Technology Stack / Technical Requirements",
    "Budget / Cost Estimation",
    "Team Structure / Resources",
    "Risk Assessment / Mitigation",
    "Success Criteria / Acceptance Criteria",
    "Testing Strategy",
    "Maintenance & Support",
    "Additional Comments / Notes",
];

/// Numbered component checklist. Extra components are split on newlines
/// and commas and numbered after the standard ones.
pub fn component_checklist(extra_components: Option<&str>) -> Vec<String> {
    let mut names: Vec<&str> = STANDARD_COMPONENTS.to_vec();
    names.extend(
        extra_components
            .into_iter()
            .flat_map(|s| s.split(['\n', ',']))
            .map(str::trim)
            .filter(|s| !s.is_empty()),
    );

    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| format!("{}. {}", i + 1, name))
        .collect()
}

fn instructions(stage: StageId) -> &'static str {
    match stage {
        StageId::ComponentAnalysis => {
            "You are a project manager experienced in reviewing RFP responses. \
             Determine which of the listed components are present in the proposal.\n\
             Answer with a Markdown table with the columns: \
             | Component | Present (✅/❌) | Details/Notes | Page Number |\n\
             Give brief details for every component that is found."
        }
        StageId::Pricing => {
            "Perform a component-wise price analysis of the proposal, using the \
             component analysis as the scope reference.\n\
             1. Map each component to its pricing; flag priced items outside the \
             scope and scope items without clear pricing.\n\
             2. Tabulate | Component | Scope | Quantity | Unit Price | Total Price | \
             Category | Notes |.\n\
             3. Assess labor rates, materials and other direct costs against market \
             norms and, when given, the historical pricing data.\n\
             4. Conclude with price reasonableness findings and negotiation points."
        }
        StageId::CostRealism => {
            "Perform a cost realism analysis (FAR 15.404-1(d)) of the proposal.\n\
             Evaluate labor, material, subcontractor and indirect costs for realism \
             against the work described, flag unusually high or low estimates, \
             and estimate the probable cost with a risk rating."
        }
        StageId::TechnicalReview => {
            "Conduct a technical evaluation of the proposal.\n\
             Assess the technical approach, feasibility and risks, the relevance \
             of past performance, staffing and management approach. Rate each \
             area and list strengths, weaknesses and deficiencies."
        }
        StageId::Compliance => {
            "Perform a compliance assessment of the proposal against typical RFP \
             requirements.\n\
             Check submission format, technical requirement coverage, contractual \
             terms and exceptions, and certifications. Present a compliance matrix \
             and list every non-compliant or unclear item."
        }
        StageId::ExecutiveSummary => {
            "As a senior contracts specialist, write an executive summary that \
             synthesizes all analyses of this proposal for decision-makers.\n\
             Include an executive overview with an overall recommendation \
             (Approve / Conditional Approval / Reject), a component status table, \
             an evaluation matrix rating each factor from 1 to 5, key risks, and \
             recommended next steps. Treat analyses marked \"Not performed\" as \
             unavailable rather than as findings."
        }
    }
}

/// Builds the full prompt for `stage`.
///
/// Required inputs are expected to be Completed in `cache`; the controller
/// checks this before calling.
pub fn build_prompt(
    stage: &StageDefinition,
    registry: &StageRegistry,
    document: &Document,
    cache: &AnalysisCache,
    extra_input: Option<&str>,
) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "Analysis stage: {}", stage.id);
    let _ = writeln!(prompt, "# {}\n", stage.label);
    let _ = writeln!(prompt, "{}\n", instructions(stage.id));

    if stage.id == StageId::ComponentAnalysis {
        let _ = writeln!(prompt, "## Components to check");
        for line in component_checklist(extra_input) {
            let _ = writeln!(prompt, "{}", line);
        }
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "## Proposal text ({})\n", document.filename);
    let _ = writeln!(prompt, "{}\n", document.text.trim_end());

    for input in stage.inputs() {
        let label = registry
            .definition(input)
            .map(|d| d.label.as_str())
            .unwrap_or(input.as_str());
        let body = cache.completed_output(input).unwrap_or(NOT_PERFORMED);
        let _ = writeln!(prompt, "## {}\n", label);
        let _ = writeln!(prompt, "{}\n", body.trim_end());
    }

    if stage.id != StageId::ComponentAnalysis && stage.accepts_extra_input {
        if let Some(extra) = extra_input.map(str::trim).filter(|s| !s.is_empty()) {
            let heading = match stage.id {
                StageId::Pricing => "Historical pricing data",
                _ => "Additional input",
            };
            let _ = writeln!(prompt, "## {}\n", heading);
            let _ = writeln!(prompt, "{}\n", extra);
        }
    }

    prompt
}
