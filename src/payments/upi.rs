use qrcode::{render::svg, QrCode};

use crate::error::{AppError, Result};

/// Builds a `upi://pay` deep link. Parameter values are percent-escaped;
/// the first parameter is joined with `?`, the rest with `&`. The amount
/// is a whole-rupee integer rendered in the two-decimal fixed format UPI
/// apps expect.
pub fn build_intent(
    payee_vpa: &str,
    payee_name: &str,
    amount: i64,
    currency: &str,
    note: &str,
    reference: &str,
) -> String {
    let amount = format!("{}.00", amount);
    let params = [
        ("pa", payee_vpa),
        ("pn", payee_name),
        ("am", amount.as_str()),
        ("cu", currency),
        ("tn", note),
        ("tr", reference),
    ];

    let mut intent = String::from("upi://pay");
    for (i, (key, value)) in params.iter().enumerate() {
        intent.push(if i == 0 { '?' } else { '&' });
        intent.push_str(key);
        intent.push('=');
        intent.push_str(&urlencoding::encode(value));
    }
    intent
}

/// Renders the intent as an SVG QR image. Pure function of its input.
pub fn render_qr_svg(intent: &str) -> Result<String> {
    let code = QrCode::new(intent.as_bytes())
        .map_err(|e| AppError::Internal(format!("QR encoding failed: {}", e)))?;

    Ok(code
        .render::<svg::Color>()
        .min_dimensions(240, 240)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_has_expected_shape() {
        let intent = build_intent(
            "gym@upi",
            "Fitdesk Gym",
            1500,
            "INR",
            "Membership payment",
            "order_abc123",
        );

        assert!(intent.starts_with("upi://pay?pa=gym%40upi&"));
        assert!(intent.contains("&am=1500.00"));
        assert!(intent.contains("&cu=INR"));
        assert!(intent.ends_with("&tr=order_abc123"));
        // Exactly one '?', everything else joined with '&'.
        assert_eq!(intent.matches('?').count(), 1);
        assert_eq!(intent.matches('&').count(), 5);
    }

    #[test]
    fn values_are_percent_escaped() {
        let intent = build_intent(
            "gym@upi",
            "Iron & Steel Gym",
            8000,
            "INR",
            "yearly renewal",
            "order_x",
        );

        assert!(intent.contains("pn=Iron%20%26%20Steel%20Gym"));
        assert!(intent.contains("tn=yearly%20renewal"));
    }

    #[test]
    fn qr_render_produces_svg() {
        let intent = build_intent("gym@upi", "Fitdesk", 100, "INR", "note", "ref");
        let svg = render_qr_svg(&intent).unwrap();
        assert!(svg.contains("<svg"));
    }
}
