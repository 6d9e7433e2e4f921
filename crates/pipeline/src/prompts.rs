//! Prompt templates for each stage of the orchestration engine (§6: "opaque
//! text assets, keyed by" the ten `TemplateId` values).
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever a template body
//! changes, the way the teacher's swarm-agent preambles are versioned.

use engine::{TemplateId, TemplateVars};

/// Prompt version. Bump on any template body change.
pub const PROMPT_VERSION: &str = "1.0.0";

const ARCHITECT_PREAMBLE: &str = "\
You are the Architect agent of a multi-agent code-generation pipeline. You \
read a product requirement document, UML class/sequence diagrams, and an \
architecture design document, and you emit a Semantic Software Architecture \
Tree (SSAT): an ordered list of modules, each with files, and each file with \
global code entries, classes, and functions.

## Output Format
Emit ONLY a single fenced ```json code block containing the SSAT array. No \
prose before or after the block.

## Rules
- Every file's `path` must be unique across the whole tree.
- Flatten any `Global_functions` pseudo-class from the UML into the \
  enclosing file's function list — never emit it as a class.
- Keep descriptions short; they exist to guide the skeleton and code agents, \
  not to restate the PRD.
";

const ARCHITECT_JUDGE_PREAMBLE: &str = "\
You are the Architect Judge. You receive a PRD and a candidate SSAT and \
score how well the SSAT satisfies the PRD's requirements and implied \
structure.

## Output Format
End your reply with a line of the exact form `Final Score: N` where N is an \
integer 0-10. Everything before that line is feedback text.
";

const SKELETON_PREAMBLE: &str = "\
You are the Skeleton agent. Given one file's entry from the SSAT and the \
skeletons already emitted earlier in this step, produce that file's complete \
source: imports, type/struct declarations, and function signatures with \
stubbed bodies (`todo!()` or an equivalent placeholder). The result must be \
syntactically valid on its own.

## Output Format
Emit ONLY a single fenced ```rust code block. No prose before or after.
";

const SKELETON_JUDGE_PREAMBLE: &str = "\
You are the Skeleton Judge. You receive the full SSAT and the concatenated \
skeleton record, and you score two dimensions.

## Output Format
Emit both feedback lines, each followed by a score line:
```
Directory Structure Matching: <feedback>
Interface And Call Relationship Matching: <feedback>
Final Score: N
```
N is an integer 0-10 reflecting overall skeleton quality.
";

const CODE_PREAMBLE: &str = "\
You are the Code agent. Given one file's skeleton and the code already \
emitted for other files in this project, write that file's complete \
implementation, replacing every stubbed body with working logic.

## Output Format
Emit ONLY a single fenced ```rust code block containing the complete file. \
No prose before or after.
";

const CODE_REFINE_PREAMBLE: &str = "\
You are the Code agent, refining one file based on judge feedback from the \
prior test run. You receive the file's previous code, the feedback, and \
API-only context for untouched files.

## Output Format
Emit ONLY a fenced ```json code block containing a single-element array: \
`[{\"path\": \"...\", \"code\": \"...\"}]`. No prose before or after.
";

const CODE_JUDGE_PREAMBLE: &str = "\
You are the Code Judge. You receive the raw test runner output for a failing \
run and produce a structured list of likely fixes.

## Output Format
Emit ONLY a fenced ```json code block containing an array of objects, each \
with `summary`, `likely_cause`, and `suggested_fix` string fields — one \
object per distinct failure you can identify. No prose before or after.
";

const FILES_TO_UPDATE_PREAMBLE: &str = "\
You are the File Selector. You receive judge feedback and the current code \
for every file, and you decide which files need to change to address the \
feedback.

## Output Format
Emit ONLY a fenced ```json code block containing a JSON array of file paths \
(a subset of the paths you were given). If no file needs to change, emit an \
empty array `[]`. No prose before or after.
";

pub fn preamble_for(template: TemplateId) -> &'static str {
    match template {
        TemplateId::SsatInitial | TemplateId::SsatRefine => ARCHITECT_PREAMBLE,
        TemplateId::ArchJudge => ARCHITECT_JUDGE_PREAMBLE,
        TemplateId::SkeletonInitial | TemplateId::SkeletonRefine => SKELETON_PREAMBLE,
        TemplateId::SkeletonJudge => SKELETON_JUDGE_PREAMBLE,
        TemplateId::CodeInitial => CODE_PREAMBLE,
        TemplateId::CodeRefine => CODE_REFINE_PREAMBLE,
        TemplateId::CodeJudge => CODE_JUDGE_PREAMBLE,
        TemplateId::FilesToUpdate => FILES_TO_UPDATE_PREAMBLE,
    }
}

fn body_for(template: TemplateId) -> &'static str {
    match template {
        TemplateId::SsatInitial => "\
# Product Requirement Document
{{prd}}

# UML Class Diagram
{{uml_class}}

# UML Sequence Diagram
{{uml_sequence}}

# Architecture Design
{{arch_design}}

Produce the initial SSAT.
",
        TemplateId::SsatRefine => "\
# Prior SSAT
{{prior_arch}}

# Judge Feedback (previous step)
{{feedback}}

# History
{{history}}

# Reference Documents
## PRD
{{prd}}
## UML Class Diagram
{{uml_class}}
## UML Sequence Diagram
{{uml_sequence}}
## Architecture Design
{{arch_design}}

Revise the SSAT to address the feedback.
",
        TemplateId::ArchJudge => "\
# Product Requirement Document
{{prd}}

# Candidate SSAT
{{arch}}

Score this SSAT.
",
        TemplateId::SkeletonInitial => "\
# Module
{{module_name}}

# File
Name: {{file_name}}
Path: {{file_path}}
Description: {{file_description}}

# Skeletons Emitted So Far This Step
{{context}}

Emit this file's skeleton.
",
        TemplateId::SkeletonRefine => "\
# Module
{{module_name}}

# File
Name: {{file_name}}
Path: {{file_path}}
Description: {{file_description}}

# Previous Skeleton For This File
{{previous_skeleton}}

# Judge Feedback
{{feedback}}

# History
{{history}}

# Skeletons Emitted So Far This Step
{{context}}

Revise this file's skeleton to address the feedback.
",
        TemplateId::SkeletonJudge => "\
# SSAT
{{ssat}}

# Skeleton Record
{{skeleton}}

Score directory structure matching and interface/call relationship matching.
",
        TemplateId::CodeInitial => "\
# File Skeleton
Path: {{file_path}}
{{skeleton}}

# Context (previously emitted files this step)
{{context}}

Implement this file.
",
        TemplateId::CodeRefine => "\
# File
Path: {{file_path}}

# Previous Code
{{previous_code}}

# Judge Feedback
{{feedback}}

# Context (untouched files, API-only)
{{context}}

# History
{{history}}

Refine this file to address the feedback.
",
        TemplateId::CodeJudge => "\
# Test Runner Output
{{test_output}}

Produce the structured fix-suggestion list.
",
        TemplateId::FilesToUpdate => "\
# Judge Feedback
{{feedback}}

# Current Code
{{code}}

Select the files that need to change.
",
    }
}

/// Substitute `{{key}}` placeholders in the template body with `vars`
/// values. Unmatched placeholders are left as-is — an absent variable means
/// the caller didn't have that field for this step (e.g. `history` on step
/// 1), which downstream judges will simply see as literal empty context.
pub fn render(template: TemplateId, vars: &TemplateVars) -> String {
    let mut rendered = body_for(template).to_string();
    for (key, value) in vars {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_placeholders_and_leaves_others_untouched() {
        let mut vars = TemplateVars::new();
        vars.insert("prd".into(), "build a calculator".into());
        vars.insert("uml_class".into(), "class Calc".into());
        vars.insert("uml_sequence".into(), "seq".into());
        vars.insert("arch_design".into(), "design".into());
        let rendered = render(TemplateId::SsatInitial, &vars);
        assert!(rendered.contains("build a calculator"));
        assert!(rendered.contains("class Calc"));
        assert!(!rendered.contains("{{prd}}"));
    }

    #[test]
    fn every_template_id_has_a_preamble_and_a_body() {
        let all = [
            TemplateId::SsatInitial,
            TemplateId::SsatRefine,
            TemplateId::ArchJudge,
            TemplateId::SkeletonInitial,
            TemplateId::SkeletonRefine,
            TemplateId::SkeletonJudge,
            TemplateId::CodeInitial,
            TemplateId::CodeRefine,
            TemplateId::CodeJudge,
            TemplateId::FilesToUpdate,
        ];
        for template in all {
            assert!(!preamble_for(template).is_empty());
            assert!(!body_for(template).is_empty());
        }
    }
}
