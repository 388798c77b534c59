use super::*;
use rstest::rstest;
use rust_decimal_macros::dec;
use std::str::FromStr;

#[test]
fn test_money_creation() {
    let money = Money::new(dec!(10000.00), Currency::Ngn);
    assert_eq!(money.amount, dec!(10000));
    assert_eq!(money.currency, Currency::Ngn);
}

#[test]
fn test_money_zero() {
    let money = Money::zero(Currency::Usd);
    assert!(money.is_zero());
    assert!(!money.is_negative());
}

#[test]
fn test_money_negative() {
    assert!(Money::new(dec!(-1.00), Currency::Ngn).is_negative());
    assert!(!Money::new(dec!(1.00), Currency::Ngn).is_negative());
}

#[rstest]
#[case(dec!(100), true)]
#[case(dec!(100.5), true)]
#[case(dec!(100.55), true)]
#[case(dec!(100.550), true)]
#[case(dec!(100.555), false)]
#[case(dec!(0.001), false)]
fn test_minor_unit_precision(#[case] amount: Decimal, #[case] expected: bool) {
    assert_eq!(has_minor_unit_precision(amount), expected);
}

#[rstest]
#[case(dec!(1.005), dec!(1.01))]
#[case(dec!(1.004), dec!(1.00))]
#[case(dec!(7.5), dec!(7.50))]
#[case(dec!(-2.345), dec!(-2.35))]
fn test_round_to_minor_units(#[case] amount: Decimal, #[case] expected: Decimal) {
    assert_eq!(round_to_minor_units(amount), expected);
}

#[test]
fn test_currency_display() {
    assert_eq!(format!("{}", Currency::Ngn), "NGN");
    assert_eq!(format!("{}", Currency::Usd), "USD");
    assert_eq!(format!("{}", Currency::Eur), "EUR");
    assert_eq!(format!("{}", Currency::Gbp), "GBP");
}

#[test]
fn test_currency_from_str() {
    assert_eq!(Currency::from_str("NGN").unwrap(), Currency::Ngn);
    assert_eq!(Currency::from_str("ngn").unwrap(), Currency::Ngn);
    assert_eq!(Currency::from_str("GBP").unwrap(), Currency::Gbp);
    assert!(Currency::from_str("IDR").is_err());
}

#[test]
fn test_currency_serde() {
    assert_eq!(serde_json::to_string(&Currency::Ngn).unwrap(), "\"NGN\"");
    let parsed: Currency = serde_json::from_str("\"EUR\"").unwrap();
    assert_eq!(parsed, Currency::Eur);
}
