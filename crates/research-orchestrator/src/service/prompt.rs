//! Authoring prompt for the composer.

use std::fmt::Write;

use research_core::ProcessorTier;

use super::composer::ComposeRequest;

const AUTHORING_RULES: &str = "\
You turn a user's research request about a business into a task definition for \
an autonomous web-research service. Respond with ONE JSON object containing \
exactly these string fields:

  \"input\": the research instruction the service will execute.
  \"output_schema\": a plain-language description of the deliverable.

Rules for \"input\":
- Self-contained: the service sees nothing except this text.
- Name the company and every identifier you were given (website, organisation number).
- State concretely what to find out; prefer recent, verifiable, sourced facts.
- Never ask the user questions and never refuse; make reasonable assumptions instead.

Rules for \"output_schema\":
- Describe sections and their order, in prose. Do not write JSON Schema.
- Ask for sources to be cited inline.
- At most 120 words.

Both fields must be non-empty strings. Output JSON only: no markdown fences, no commentary.";

/// Build the meta-prompt for one compose request.
pub fn build_meta_prompt(request: &ComposeRequest) -> String {
    let tier = request.processor.unwrap_or_default();
    let mut prompt = String::with_capacity(2048);

    prompt.push_str(AUTHORING_RULES);
    prompt.push_str("\n\n");
    push_budget(&mut prompt, tier);

    let company = non_blank(request.company_block.as_deref());
    let context = non_blank(request.business_context.as_deref());

    match company {
        Some(block) => {
            prompt.push_str(
                "\nCopy the identifying facts from the COMPANY block verbatim into \"input\".\n",
            );
            let _ = write!(prompt, "\nCOMPANY:\n{}\n", block);
        }
        None => {
            prompt.push_str(
                "\nNo COMPANY block was provided. Do not invent websites or organisation numbers.\n",
            );
        }
    }

    if let Some(context) = context {
        prompt.push_str(
            "\nUse the BUSINESS CONTEXT to decide what matters most. Do not copy it verbatim.\n",
        );
        let _ = write!(prompt, "\nBUSINESS CONTEXT:\n{}\n", context);
    }

    let _ = write!(prompt, "\nUSER REQUEST:\n{}\n", request.prompt.trim());
    prompt
}

fn push_budget(prompt: &mut String, tier: ProcessorTier) {
    let _ = writeln!(
        prompt,
        "The service runs on the \"{}\" processor. Size the deliverable described in \
         \"output_schema\" to roughly {} words.",
        tier,
        tier.word_budget()
    );
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
