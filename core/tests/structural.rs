//! Fiscal, composite and policy-rate recalculation.

use rstar_scenario_core::structural::{
    composite_rstar, fiscal_rstar, policy_rate, recalculate, FiscalInputs, StructuralAnchors,
};

fn inputs(debt_gdp: f64, primary_balance: f64, cds_5y: f64) -> FiscalInputs {
    FiscalInputs { debt_gdp, primary_balance, cds_5y }
}

#[test]
fn base_rate_when_no_premia_apply() {
    // Debt at threshold, surplus, zero CDS.
    assert_eq!(fiscal_rstar(&inputs(60.0, 1.0, 0.0)), 4.0);
}

#[test]
fn fiscal_rstar_matches_weighted_premia() {
    let r = fiscal_rstar(&inputs(78.0, -0.5, 150.0));
    let expected = 4.0 + 0.4 * (18.0 * 0.08) + 0.3 * (0.5 * 0.50) + 0.3 * (1.5 * 0.35);
    assert!((r - expected).abs() < 1e-12, "{r} vs {expected}");
}

#[test]
fn fiscal_rstar_non_decreasing_in_debt() {
    let mut last = f64::NEG_INFINITY;
    for debt in (40..=140).map(f64::from) {
        let r = fiscal_rstar(&inputs(debt, 0.0, 100.0));
        assert!(r >= last, "decreased at debt {debt}");
        last = r;
    }
    // Flat below the threshold.
    assert_eq!(fiscal_rstar(&inputs(40.0, 0.0, 100.0)), fiscal_rstar(&inputs(60.0, 0.0, 100.0)));
}

#[test]
fn fiscal_rstar_non_decreasing_in_deficit() {
    let mut last = f64::NEG_INFINITY;
    for tenths in 0..=60 {
        let deficit = -(tenths as f64) / 10.0;
        let r = fiscal_rstar(&inputs(70.0, deficit, 100.0));
        assert!(r >= last, "decreased at primary balance {deficit}");
        last = r;
    }
    // Surpluses earn no discount.
    assert_eq!(fiscal_rstar(&inputs(70.0, 3.0, 100.0)), fiscal_rstar(&inputs(70.0, 0.0, 100.0)));
}

#[test]
fn fiscal_rstar_non_decreasing_in_cds() {
    let mut last = f64::NEG_INFINITY;
    for cds in (0..=600).step_by(10).map(f64::from) {
        let r = fiscal_rstar(&inputs(70.0, -1.0, cds));
        assert!(r >= last, "decreased at cds {cds}");
        last = r;
    }
}

#[test]
fn composite_only_moves_by_weighted_fiscal_change() {
    assert_eq!(composite_rstar(4.75, 6.42, 6.42, 0.15), 4.75);
    assert!((composite_rstar(4.75, 6.42, 7.42, 0.15) - 4.90).abs() < 1e-12);
    assert_eq!(composite_rstar(4.75, 6.42, 9.0, 0.0), 4.75);
}

#[test]
fn policy_rate_is_fisher_sum() {
    assert_eq!(policy_rate(4.5, 5.0, 0.5), 10.0);
}

#[test]
fn recalculate_chains_all_three() {
    let anchors = StructuralAnchors {
        current_composite:    4.75,
        current_fiscal_rstar: 6.42,
        fiscal_weight:        0.15,
        ipca_exp:             5.0,
        term_premium:         0.5,
    };
    let x = inputs(90.0, -2.0, 300.0);
    let out = recalculate(&x, &anchors);

    assert_eq!(out.fiscal_rstar, fiscal_rstar(&x));
    assert_eq!(out.composite_rstar, composite_rstar(4.75, 6.42, out.fiscal_rstar, 0.15));
    assert_eq!(out.policy_rate, policy_rate(out.composite_rstar, 5.0, 0.5));
}
