use crate::{Alert, AlertType};

pub struct EmailTemplate;

impl EmailTemplate {
    /// Plain-text alternative for mail clients that skip HTML.
    pub fn render_plain(alert: &Alert) -> String {
        let mut body = format!("{}\n\n{}\n", alert.title, alert.message);
        if let AlertType::TradesSubmitted { items } = &alert.alert_type {
            body.push('\n');
            for item in items {
                body.push_str(&format!(
                    "{:<8}{:<6}score {:.1}\n",
                    item.symbol, item.signal, item.strength
                ));
            }
        }
        body.push_str(&format!("\nSent {}\n", alert.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
        body
    }

    pub fn render(alert: &Alert) -> String {
        let body_content = match &alert.alert_type {
            AlertType::TradesSubmitted { items } => {
                let rows: String = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let shade = if i % 2 == 1 { r#" style="background:#f8fafc;""# } else { "" };
                        format!(
                            r#"<tr{shade}><td style="padding:8px 12px;font-weight:600;">{}</td><td style="padding:8px 12px;color:#22c55e;font-weight:600;">{}</td><td style="padding:8px 12px;">{:.1}</td></tr>"#,
                            escape(&item.symbol),
                            escape(&item.signal),
                            item.strength
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n  ");
                format!(
                    r#"<div style="background:#22c55e;color:#fff;padding:12px 20px;border-radius:8px 8px 0 0;font-size:18px;font-weight:700;">{count} Bracket Order(s) Submitted</div>
<table style="width:100%;border-collapse:collapse;">
  <tr><td style="padding:8px 12px;color:#94a3b8;">Symbol</td><td style="padding:8px 12px;color:#94a3b8;">Signal</td><td style="padding:8px 12px;color:#94a3b8;">Strength</td></tr>
  {rows}
</table>"#,
                    count = items.len()
                )
            }
            AlertType::Notice => {
                format!(
                    r#"<div style="background:#3b82f6;color:#fff;padding:12px 20px;border-radius:8px 8px 0 0;font-size:18px;font-weight:700;">{}</div>"#,
                    escape(&alert.title)
                )
            }
        };

        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1"></head>
<body style="margin:0;padding:0;background:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;">
<table width="100%" cellpadding="0" cellspacing="0" style="background:#f1f5f9;padding:32px 0;">
  <tr><td align="center">
    <table width="600" cellpadding="0" cellspacing="0" style="background:#ffffff;border-radius:8px;overflow:hidden;box-shadow:0 1px 3px rgba(0,0,0,0.1);">
      <tr><td>
        {body_content}
      </td></tr>
      <tr><td style="padding:16px 20px;border-top:1px solid #e2e8f0;">
        <p style="margin:0;color:#94a3b8;font-size:12px;">
          {msg}
          <br>Sent at {ts} UTC
        </p>
      </td></tr>
    </table>
    <p style="color:#94a3b8;font-size:11px;margin-top:16px;">AutoTrade Notification Service</p>
  </td></tr>
</table>
</body>
</html>"#,
            msg = escape(&alert.message),
            ts = alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
