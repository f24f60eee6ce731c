//! Specialist and multidisciplinary prompt templates.
//!
//! Each specialist reviews the same report from one clinical angle; the
//! multidisciplinary prompt folds their three reports into a short list of
//! likely issues.

use std::fmt;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Specialist roles that analyse a report in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Specialist {
    Cardiologist,
    Psychologist,
    Pulmonologist,
}

impl Specialist {
    pub fn all() -> &'static [Specialist] {
        &[Self::Cardiologist, Self::Psychologist, Self::Pulmonologist]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cardiologist => "Cardiologist",
            Self::Psychologist => "Psychologist",
            Self::Pulmonologist => "Pulmonologist",
        }
    }
}

impl fmt::Display for Specialist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the synthesis step in progress snapshots and saved reports.
pub const SYNTHESIS_NAME: &str = "MultidisciplinaryTeam";

// ═══════════════════════════════════════════════════════════
// Specialist prompts
// ═══════════════════════════════════════════════════════════

fn specialist_template(specialist: Specialist) -> &'static str {
    match specialist {
        Specialist::Cardiologist => {
            "Act like a cardiologist. You will receive a medical report of a patient.\n\
             Task: Review the patient's cardiac workup, including ECG, blood tests, \
             Holter monitor results, and echocardiogram.\n\
             Focus: Determine any subtle signs of cardiac issues that could explain \
             the patient's symptoms.\n\
             Recommendation: Suggest potential next steps and management. \
             Give a detailed report of roughly 200 words."
        }
        Specialist::Psychologist => {
            "Act like a psychologist. You will receive a patient's report.\n\
             Task: Provide a psychological assessment and identify mental health issues \
             like anxiety, depression, or trauma.\n\
             Recommendation: Suggest therapy or interventions. \
             Give a detailed report of roughly 200 words."
        }
        Specialist::Pulmonologist => {
            "Act like a pulmonologist. You will receive a patient's report.\n\
             Task: Assess for issues like asthma, COPD, or infections affecting breathing.\n\
             Recommendation: Suggest appropriate tests or follow-ups. \
             Give a detailed report of roughly 200 words."
        }
    }
}

/// Build the user prompt for one specialist over the report text.
pub fn specialist_prompt(specialist: Specialist, report: &str) -> String {
    format!(
        "{}\n\n<medical_report>\n{}\n</medical_report>",
        specialist_template(specialist),
        escape_xml_tags(report)
    )
}

// ═══════════════════════════════════════════════════════════
// Multidisciplinary synthesis
// ═══════════════════════════════════════════════════════════

const SYNTHESIS_TEMPLATE: &str = "\
Act like a multidisciplinary team of healthcare professionals.
You will receive a medical report of a patient visited by a Cardiologist, \
Psychologist, and Pulmonologist.
Task: Review the patient's medical report from the Cardiologist, Psychologist, \
and Pulmonologist, analyze them and come up with a list of 3 possible health \
issues of the patient.
Just return a list of bullet points of 3 possible health issues of the patient \
and for each issue provide the reason.";

/// Build the synthesis prompt from named specialist reports, in the order given.
pub fn synthesis_prompt<'a>(reports: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut prompt = String::from(SYNTHESIS_TEMPLATE);
    prompt.push('\n');
    for (name, report) in reports {
        prompt.push_str(&format!("\n{name} Report: {}\n", escape_xml_tags(report)));
    }
    prompt
}

/// Keep report text from closing the prompt's delimiting tags.
fn escape_xml_tags(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
