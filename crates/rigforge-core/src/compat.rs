//! Compatibility rule engine.
//!
//! Produces one deterministic, ordered report for a build, used identically
//! for live feedback, pre-save validation (advisory, not blocking) and
//! review of persisted builds.  Every rule always runs (the engine never
//! short-circuits), and a rule that cannot see both of its components
//! reports an inconclusive pass instead of being skipped silently, so
//! callers can tell "checked and fine" apart from "not applicable".

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AttrValue, Build, Category, Component};

/// Safety multiplier applied to the estimated power draw before comparing
/// against the PSU's rated wattage.
pub const PSU_HEADROOM: f64 = 1.25;

/// Fixed rule identifiers, in evaluation (and report) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    CpuSocket,
    RamMobo,
    CaseFormFactor,
    CaseGpuClearance,
    PsuWattage,
}

impl RuleId {
    pub const ALL: [RuleId; 5] = [
        RuleId::CpuSocket,
        RuleId::RamMobo,
        RuleId::CaseFormFactor,
        RuleId::CaseGpuClearance,
        RuleId::PsuWattage,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            RuleId::CpuSocket => "cpu_socket",
            RuleId::RamMobo => "ram_mobo",
            RuleId::CaseFormFactor => "case_form_factor",
            RuleId::CaseGpuClearance => "case_gpu_clearance",
            RuleId::PsuWattage => "psu_wattage",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single rule.
///
/// `Inconclusive` covers both "a component on one side is absent" and "the
/// data needed for the check did not parse"; it counts as passed for
/// aggregation but stays distinguishable in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule: RuleId,
    pub verdict: Verdict,
    pub message: String,
}

impl RuleResult {
    pub fn passed(&self) -> bool {
        self.verdict != Verdict::Fail
    }

    fn pass(rule: RuleId, message: impl Into<String>) -> Self {
        Self {
            rule,
            verdict: Verdict::Pass,
            message: message.into(),
        }
    }

    fn fail(rule: RuleId, message: impl Into<String>) -> Self {
        Self {
            rule,
            verdict: Verdict::Fail,
            message: message.into(),
        }
    }

    fn inconclusive(rule: RuleId, message: impl Into<String>) -> Self {
        Self {
            rule,
            verdict: Verdict::Inconclusive,
            message: message.into(),
        }
    }
}

/// Run every rule over the build, in [`RuleId::ALL`] order.
pub fn evaluate(build: &Build) -> Vec<RuleResult> {
    vec![
        check_cpu_socket(
            build.component(Category::Cpu),
            build.component(Category::Motherboard),
        ),
        check_ram_mobo(
            build.component(Category::Ram),
            build.component(Category::Motherboard),
        ),
        check_case_form_factor(
            build.component(Category::Case),
            build.component(Category::Motherboard),
        ),
        check_case_gpu_clearance(
            build.component(Category::Case),
            build.component(Category::Gpu),
        ),
        check_psu_wattage(build),
    ]
}

fn check_cpu_socket(cpu: Option<&Component>, mobo: Option<&Component>) -> RuleResult {
    let (Some(cpu), Some(mobo)) = (cpu, mobo) else {
        return RuleResult::inconclusive(
            RuleId::CpuSocket,
            "CPU or motherboard not selected, socket not checked",
        );
    };
    // Exact string match, no normalization.
    let cpu_socket = cpu.str_attr("socket");
    let mobo_socket = mobo.str_attr("socket");
    if cpu_socket != mobo_socket {
        return RuleResult::fail(
            RuleId::CpuSocket,
            format!(
                "CPU socket {} does not match motherboard socket {}",
                cpu_socket.unwrap_or("?"),
                mobo_socket.unwrap_or("?")
            ),
        );
    }
    RuleResult::pass(RuleId::CpuSocket, "CPU and motherboard sockets match")
}

fn check_ram_mobo(ram: Option<&Component>, mobo: Option<&Component>) -> RuleResult {
    let (Some(ram), Some(mobo)) = (ram, mobo) else {
        return RuleResult::inconclusive(
            RuleId::RamMobo,
            "RAM or motherboard not selected, memory type not checked",
        );
    };
    let ram_type = ram.str_attr("memory_type");
    let mobo_type = mobo.str_attr("memory_type");
    if ram_type != mobo_type {
        return RuleResult::fail(
            RuleId::RamMobo,
            format!(
                "RAM type {} does not match motherboard supported {}",
                ram_type.unwrap_or("?"),
                mobo_type.unwrap_or("?")
            ),
        );
    }

    // Stick count vs physical slots.  A missing stick count defaults to a
    // single stick; a missing or unreadable slot count leaves the check
    // unverified rather than failing the build.
    let sticks = match ram.attr("sticks") {
        None => Some(1),
        Some(value) => value.as_int(),
    };
    let slots = mobo.attr("memory_slots").and_then(AttrValue::as_int);
    match (sticks, slots) {
        (Some(sticks), Some(slots)) if sticks > slots => RuleResult::fail(
            RuleId::RamMobo,
            format!("RAM sticks ({sticks}) exceed motherboard slots ({slots})"),
        ),
        (Some(_), Some(_)) => {
            RuleResult::pass(RuleId::RamMobo, "RAM compatible with motherboard")
        }
        _ => RuleResult::inconclusive(
            RuleId::RamMobo,
            "memory slot count unknown, stick fit not verified",
        ),
    }
}

fn check_case_form_factor(case: Option<&Component>, mobo: Option<&Component>) -> RuleResult {
    let (Some(case), Some(mobo)) = (case, mobo) else {
        return RuleResult::inconclusive(
            RuleId::CaseFormFactor,
            "case or motherboard not selected, form factor not checked",
        );
    };
    let Some(mobo_ff) = mobo.str_attr("form_factor") else {
        return RuleResult::inconclusive(
            RuleId::CaseFormFactor,
            "motherboard form factor unknown",
        );
    };
    let Some(supported) = case.str_attr("supported_form_factors") else {
        return RuleResult::inconclusive(
            RuleId::CaseFormFactor,
            "case supported form factors unknown",
        );
    };
    // Membership in the comma-delimited support list, not a substring match.
    if supported.split(',').any(|ff| ff.trim() == mobo_ff) {
        RuleResult::pass(RuleId::CaseFormFactor, "Motherboard fits case form factor")
    } else {
        RuleResult::fail(
            RuleId::CaseFormFactor,
            format!("Motherboard form factor {mobo_ff} not supported by case ({supported})"),
        )
    }
}

fn check_case_gpu_clearance(case: Option<&Component>, gpu: Option<&Component>) -> RuleResult {
    let (Some(case), Some(gpu)) = (case, gpu) else {
        return RuleResult::inconclusive(
            RuleId::CaseGpuClearance,
            "case or GPU not selected, clearance not checked",
        );
    };
    match (
        gpu.float_attr("length_mm"),
        case.float_attr("max_gpu_length_mm"),
    ) {
        (Some(length), Some(max)) if length > max => RuleResult::fail(
            RuleId::CaseGpuClearance,
            format!("GPU length {length}mm exceeds case maximum {max}mm"),
        ),
        (Some(_), Some(_)) => RuleResult::pass(RuleId::CaseGpuClearance, "GPU fits in case"),
        _ => RuleResult::inconclusive(
            RuleId::CaseGpuClearance,
            "GPU length or case clearance unknown, fit not verified",
        ),
    }
}

fn check_psu_wattage(build: &Build) -> RuleResult {
    // Unlike the other rules, a missing PSU is a hard failure: a build
    // cannot power itself.
    let Some(psu) = build.component(Category::Psu) else {
        return RuleResult::fail(RuleId::PsuWattage, "No PSU selected");
    };
    let Some(rated) = psu.float_attr("wattage") else {
        return RuleResult::fail(RuleId::PsuWattage, "PSU wattage unknown");
    };

    let draw: f64 = Category::ALL
        .iter()
        .filter(|&&category| category != Category::Psu)
        .filter_map(|&category| build.component(category))
        .filter_map(|part| part.float_attr("power_draw"))
        .sum();

    let required = draw * PSU_HEADROOM;
    if rated < required {
        RuleResult::fail(
            RuleId::PsuWattage,
            format!(
                "PSU wattage {rated}W insufficient for estimated draw {draw}W \
                 (required with headroom: {required}W)"
            ),
        )
    } else {
        RuleResult::pass(
            RuleId::PsuWattage,
            format!("PSU wattage {rated}W covers estimated draw {draw}W with headroom"),
        )
    }
}
