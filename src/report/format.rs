//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (important for snapshot tests)

use crate::app::pipeline::RunOutput;
use crate::domain::{PipelineConfig, SpectralFit};
use crate::fit::{PARAM_LOGG, PARAM_RV, PARAM_TEFF};
use crate::sampler::posterior::ParamSummary;

/// Format the full run summary (data, template, period, orbit and masses).
pub fn format_run_summary(run: &RunOutput, config: &PipelineConfig) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== wdrv - white dwarf RV summary (catalog id {}) ===\n", run.catalog_id));
    if let Some(id) = run.gaia_source_id() {
        out.push_str(&format!("Gaia EDR3 {id}\n"));
    }
    out.push_str(&format!(
        "Exposures: loaded={} | in RV series={} | dropped={}\n",
        run.n_loaded,
        run.series.len(),
        run.dropped.len()
    ));
    out.push_str(&format!(
        "Baseline: {:.3} d | seed={} | walkers={} steps={} burn-in={} thin={}\n",
        run.series.baseline(),
        config.seed,
        config.walkers,
        config.steps,
        config.burn_in,
        config.thin
    ));

    out.push_str("\nTemplate refinement:\n");
    for p in &run.refinement.passes {
        let flag = if p.converged { " " } else { "!" };
        out.push_str(&format!(
            "{flag} pass {}: teff={:.0} K logg={:.3} rv={:.2} km/s\n",
            p.pass, p.teff, p.logg, p.rv
        ));
    }
    out.push_str(&format!(
        "- {}\n",
        if run.refinement.settled { "settled" } else { "stopped at pass limit" }
    ));

    out.push_str("\nAtmosphere (rest-frame co-add):\n");
    out.push_str(&format_fit_params(&run.atmosphere));

    out.push_str("\nRVs:\n");
    if let Some(v) = &run.variability {
        out.push_str(&format!(
            "- weighted mean={:.2} km/s | redchi={:.2} | ΔRV_max={:.1} km/s\n",
            v.weighted_mean, v.redchi, v.delta_rv_max
        ));
    }
    out.push_str(&format!(
        "- best period: {:.5} d = {:.4} hr (power {:.3}, df={:.2e} 1/d)\n",
        run.periodogram.period_days,
        run.periodogram.period_hours(),
        run.periodogram.best_power,
        run.periodogram.resolution()
    ));

    out.push_str("\nLeast-squares orbit:\n");
    out.push_str(&format!(
        "- gamma={} K={} phi={} | redchi={:.2}{}\n",
        fmt_estimate(run.orbit.gamma.value, run.orbit.gamma.stderr),
        fmt_estimate(run.orbit.k.value, run.orbit.k.stderr),
        fmt_estimate(run.orbit.phi.value, run.orbit.phi.stderr),
        run.orbit.redchi,
        if run.orbit.converged { "" } else { " (not converged)" }
    ));

    out.push_str(&format!(
        "\nPosterior (acceptance {:.3}, {} samples):\n",
        run.posterior.acceptance_fraction, run.posterior.n_samples
    ));
    out.push_str(&format_orbit_table(&run.posterior.summary));

    let m = &run.mass;
    out.push_str("\nMasses:\n");
    out.push_str(&format!("- M1 = {:.3} M☉ ({:?})\n", m.primary.mass, m.primary.source));
    out.push_str(&format!(
        "- f(M) = {:.4} [{:.4}, {:.4}] M☉\n",
        m.mass_function.p50, m.mass_function.p16, m.mass_function.p84
    ));
    out.push_str(&format!(
        "- M2 = {:.3} [{:.3}, {:.3}] M☉ | Mt = {:.3} [{:.3}, {:.3}] M☉\n",
        m.m2.p50, m.m2.p16, m.m2.p84, m.total_mass.p50, m.total_mass.p16, m.total_mass.p84
    ));
    out.push_str(&format!(
        "- P(Mt > 1) = {:.3} | P(Mt > 1.4) = {:.3} (n={})\n",
        m.p_total_above_1, m.p_total_above_chandrasekhar, m.n_mass_samples
    ));

    if let Some(c) = &run.cmd {
        out.push_str("\nCMD:\n");
        out.push_str(&format!(
            "- G_abs={:.2} [{:.2}, {:.2}] | BP-RP={:.3}\n",
            c.position.g_abs, c.position.g_abs_lo, c.position.g_abs_hi, c.position.bp_rp
        ));
        match &c.photometric {
            Some(p) => out.push_str(&format!(
                "- photometric teff={:.0} K logg={:.2} M={:.3} M☉\n",
                p.teff, p.logg, p.mass
            )),
            None => out.push_str("- off the cooling grid\n"),
        }
    }
    out.push('\n');

    out
}

/// Posterior summary table, one row per parameter.
pub fn format_orbit_table(summary: &[ParamSummary]) -> String {
    let mut out = String::new();
    out.push_str(
        format!("{:<8} {:>10} {:>10} {:>10} {:>10} {:>10}", "param", "mean", "std", "p16", "p50", "p84").trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<8} {:-<10} {:-<10} {:-<10} {:-<10} {:-<10}", "", "", "", "", "", "").trim_end());
    out.push('\n');
    for s in summary {
        out.push_str(
            format!(
                "{:<8} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
                truncate(s.name, 8),
                s.mean,
                s.std,
                s.p16,
                s.p50,
                s.p84
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

fn format_fit_params(fit: &SpectralFit) -> String {
    let mut out = String::new();
    for name in [PARAM_TEFF, PARAM_LOGG, PARAM_RV] {
        if let Some(p) = fit.get(name) {
            out.push_str(&format!("- {name:<5} = {}\n", fmt_estimate(p.value, p.stderr)));
        }
    }
    out.push_str(&format!(
        "- redchi={:.3} n={}{}\n",
        fit.redchi,
        fit.n_data,
        if fit.converged { "" } else { " (not converged)" }
    ));
    out
}

fn fmt_estimate(value: f64, stderr: Option<f64>) -> String {
    match stderr {
        Some(e) => format!("{value:.3}±{e:.3}"),
        None => format!("{value:.3}"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_table_snapshot() {
        let summary = vec![
            ParamSummary { name: "gamma", mean: 12.0, std: 1.5, p16: 10.5, p50: 12.0, p84: 13.5 },
            ParamSummary { name: "jitter_kms", mean: 3.25, std: 0.5, p16: 2.75, p50: 3.25, p84: 3.75 },
        ];
        let txt = format_orbit_table(&summary);
        let expected = concat!(
            "param          mean        std        p16        p50        p84\n",
            "-------- ---------- ---------- ---------- ---------- ----------\n",
            "gamma        12.000      1.500     10.500     12.000     13.500\n",
            "jitter_.      3.250      0.500      2.750      3.250      3.750\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn estimates_show_errors_when_available() {
        assert_eq!(fmt_estimate(1.0, Some(0.25)), "1.000±0.250");
        assert_eq!(fmt_estimate(-2.5, None), "-2.500");
    }
}
