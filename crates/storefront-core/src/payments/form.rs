//! Auto-submitting checkout form.

use storefront_signature::{escape_html_attribute, ParamValue};

const FORM_ID: &str = "ecpay-form";

/// Renders a hidden-field form posting `fields` to `action`, followed by a
/// script that submits it on load.
pub fn render_payment_form(action: &str, fields: &[(String, ParamValue)]) -> String {
	let inputs = fields
		.iter()
		.map(|(name, value)| {
			format!(
				"    <input type=\"hidden\" name=\"{}\" value=\"{}\" />",
				escape_html_attribute(name),
				escape_html_attribute(&value.to_string())
			)
		})
		.collect::<Vec<_>>()
		.join("\n");

	format!(
		"<form id=\"{id}\" method=\"post\" action=\"{action}\">\n{inputs}\n</form>\n\
		 <script>document.getElementById(\"{id}\").submit();</script>",
		id = FORM_ID,
		action = escape_html_attribute(action),
		inputs = inputs,
	)
}
