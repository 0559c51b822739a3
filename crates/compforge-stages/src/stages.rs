//! The three pipeline stages.
//!
//! Each stage only decides what to send. Outputs are treated as opaque text
//! and passed verbatim to the next stage.

use compforge_utils::types::{ProviderId, StageId};

use crate::Stage;

/// Stage 1: free-text request to a structured JSON component specification.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecDraftStage;

/// Stage 2: specification to component code, on the caller-selected provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeGenStage;

/// Stage 3: generated code to an audit report.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditStage;

/// Sections every audit report carries, in order.
pub const AUDIT_SECTIONS: [&str; 4] = ["SCORE", "CRITICAL ISSUES", "WARNINGS", "RECOMMENDATIONS"];

const SPEC_DRAFT_INSTRUCTION: &str = r#"You are a product engineer writing component specifications for a low-code platform.
The platform renders custom components inside a sandboxed iframe: no network access, no external scripts or stylesheets, no browser storage, and all data arrives through the platform's data-binding properties.

Turn the user's request into a single JSON object with these fields:
- "name": PascalCase component name
- "summary": one sentence
- "properties": array of { "name", "type", "default", "description" }
- "events": array of { "name", "payload", "description" }
- "layout": description of structure and sizing behaviour
- "styling": colours, typography and states
- "accessibility": keyboard and screen-reader requirements
- "constraints": platform limits the implementation must respect

Return only the JSON object, without commentary or code fences."#;

const CODE_GEN_INSTRUCTION: &str = r#"You are a senior front-end engineer implementing a custom component for a low-code platform.
The platform renders custom components inside a sandboxed iframe: no network access, no external scripts or stylesheets, no browser storage, and all data arrives through the platform's data-binding properties.

Implement the component described by the JSON specification you are given.
- Use a single self-contained HTML document with inline CSS and vanilla JavaScript.
- Expose every specified property and emit every specified event through the platform bridge.
- Handle missing or malformed property values without throwing.
- Meet the accessibility requirements in the specification."#;

const AUDIT_INSTRUCTION: &str = r#"You are a meticulous code reviewer auditing a custom component built for a sandboxed low-code platform (no network access, no external resources, no browser storage).

Review the code you are given for correctness, platform-constraint violations, security, accessibility and maintainability.
Reply using exactly these sections, in this order, each as a markdown heading:

## SCORE
An integer from 0 to 100 followed by one sentence of justification.

## CRITICAL ISSUES
Bulleted list of defects that break the component or violate platform constraints, or "None".

## WARNINGS
Bulleted list of risky or fragile constructs, or "None".

## RECOMMENDATIONS
Bulleted list of concrete improvements."#;

impl Stage for SpecDraftStage {
    fn id(&self) -> StageId {
        StageId::SpecDraft
    }

    fn system_instruction(&self, _provider: ProviderId) -> String {
        SPEC_DRAFT_INSTRUCTION.to_string()
    }

    fn prompt(&self, input: &str) -> String {
        format!("Component request:\n\n{}", input.trim())
    }
}

impl CodeGenStage {
    /// Provider-specific wording. The contract is the same for all three.
    fn output_hint(provider: ProviderId) -> &'static str {
        match provider {
            ProviderId::Gemini => {
                "Return the complete document in one ```html fenced code block and nothing else."
            }
            ProviderId::Claude => {
                "Respond with one ```html fenced code block containing the complete document. Do not add explanations before or after it."
            }
            ProviderId::OpenAi => {
                "Output only the complete document inside a single ```html fenced code block; no prose."
            }
        }
    }
}

impl Stage for CodeGenStage {
    fn id(&self) -> StageId {
        StageId::CodeGen
    }

    fn system_instruction(&self, provider: ProviderId) -> String {
        format!("{CODE_GEN_INSTRUCTION}\n\n{}", Self::output_hint(provider))
    }

    fn prompt(&self, input: &str) -> String {
        format!("Component specification:\n\n{input}")
    }
}

impl Stage for AuditStage {
    fn id(&self) -> StageId {
        StageId::Audit
    }

    fn system_instruction(&self, _provider: ProviderId) -> String {
        AUDIT_INSTRUCTION.to_string()
    }

    fn prompt(&self, input: &str) -> String {
        format!("Component code to audit:\n\n{input}")
    }
}

/// Stage implementation for an id.
#[must_use]
pub fn stage_for(id: StageId) -> &'static dyn Stage {
    match id {
        StageId::SpecDraft => &SpecDraftStage,
        StageId::CodeGen => &CodeGenStage,
        StageId::Audit => &AuditStage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_for_returns_matching_ids() {
        for id in StageId::ALL {
            assert_eq!(stage_for(id).id(), id);
        }
    }

    #[test]
    fn test_codegen_instruction_differs_only_in_hint() {
        let instructions: Vec<String> = ProviderId::ALL
            .into_iter()
            .map(|p| CodeGenStage.system_instruction(p))
            .collect();

        for instruction in &instructions {
            assert!(instruction.starts_with(CODE_GEN_INSTRUCTION));
            assert!(instruction.contains("```html"));
        }
        assert_ne!(instructions[0], instructions[1]);
        assert_ne!(instructions[1], instructions[2]);
    }

    #[test]
    fn test_audit_instruction_names_every_section() {
        let instruction = AuditStage.system_instruction(ProviderId::Gemini);
        for section in AUDIT_SECTIONS {
            assert!(instruction.contains(&format!("## {section}")), "missing {section}");
        }
    }

    #[test]
    fn test_prompts_carry_input_verbatim() {
        let spec = "{\n  \"name\": \"Gauge\"\n}\n";
        assert!(CodeGenStage.prompt(spec).ends_with(spec));
        assert!(AuditStage.prompt("<div></div>").ends_with("<div></div>"));
        assert_eq!(
            SpecDraftStage.prompt("  a circular gauge 0-100 \n"),
            "Component request:\n\na circular gauge 0-100"
        );
    }
}
