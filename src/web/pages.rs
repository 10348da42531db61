//! HTML pages for the manual cookie bank

use crate::gateway::SavedCookies;

const STYLE: &str = "body { font-family: Arial, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #333; }
        .saved { background: #d4edda; padding: 15px; border-radius: 5px; margin-bottom: 20px; }
        .instructions { background: #f8f9fa; padding: 20px; border-radius: 5px; margin-bottom: 20px; }
        .instructions ol { margin: 0; padding-left: 20px; }
        textarea { width: 100%; height: 150px; margin: 10px 0; font-family: monospace; }
        button { background: #007bff; color: white; padding: 10px 20px; border: none; border-radius: 5px; cursor: pointer; }
        .version { color: #666; font-size: 12px; }
        .success { background: #d4edda; padding: 20px; border-radius: 5px; text-align: center; }
        .error { background: #f8d7da; padding: 20px; border-radius: 5px; text-align: center; }";

/// Length of the saved cookie preview
const PREVIEW_CHARS: usize = 100;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn document(title: &str, head_extra: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>
<html>
<head>
    <title>{title}</title>
    {head_extra}
    <style>
        {STYLE}
    </style>
</head>
<body>
{body}
</body>
</html>
"
    )
}

/// `GET /cookies`
pub fn cookie_form(saved: Option<&SavedCookies>, portal_url: &str, docs_href: Option<&str>) -> String {
    let saved_info = match saved {
        Some(saved) => {
            let preview: String = saved.cookies.chars().take(PREVIEW_CHARS).collect();
            let saved_at = if saved.saved_at.is_empty() {
                "unknown"
            } else {
                saved.saved_at.as_str()
            };
            format!(
                "<div class=\"saved\">
        <strong>Current saved cookies:</strong><br>
        <code style=\"word-break: break-all;\">{}...</code><br>
        <small>Saved at: {}</small>
    </div>",
                escape(&preview),
                escape(saved_at)
            )
        }
        None => String::new(),
    };
    let docs_link = docs_href
        .map(|href| format!("<p><a href=\"{}\">Back to API Docs</a></p>", href))
        .unwrap_or_default();
    let host = portal_url
        .trim_start_matches("https://")
        .trim_start_matches("http://");

    let body = format!(
        "    <h1>PSEG Manual Cookie Setup</h1>
    <p class=\"version\">Version {version}</p>

    {saved_info}

    <div class=\"instructions\">
        <strong>How to get cookies:</strong>
        <ol>
            <li>Open Chrome/Firefox and go to <a href=\"{portal_url}\" target=\"_blank\">{host}</a></li>
            <li>Log in manually (complete reCAPTCHA)</li>
            <li>Once logged in, open Developer Tools (F12)</li>
            <li>Go to Application tab, then Cookies, then {host}</li>
            <li>Find <strong>MM_SID</strong> and <strong>__RequestVerificationToken</strong></li>
            <li>Copy their values and paste below in format:<br>
                <code>MM_SID=value; __RequestVerificationToken=value</code></li>
        </ol>
    </div>

    <form action=\"/cookies\" method=\"post\">
        <label for=\"cookies\"><strong>Paste cookies here:</strong></label>
        <textarea name=\"cookies\" id=\"cookies\" placeholder=\"MM_SID=abc123; __RequestVerificationToken=xyz789\"></textarea>
        <button type=\"submit\">Save Cookies</button>
    </form>

    {docs_link}",
        version = env!("APP_VERSION"),
    );
    document("PSEG Manual Cookie Setup", "", &body)
}

/// `POST /cookies` success, redirects back after two seconds
pub fn saved_page() -> String {
    document(
        "Cookies Saved",
        "<meta http-equiv=\"refresh\" content=\"2;url=/cookies\">",
        "    <div class=\"success\">
        <h2>Cookies saved successfully!</h2>
        <p>Redirecting...</p>
    </div>",
    )
}

pub fn save_failed_page(reason: &str) -> String {
    document(
        "Error",
        "",
        &format!(
            "    <div class=\"error\">
        <h2>Failed to save cookies</h2>
        <p>{}</p>
        <p><a href=\"/cookies\">Try again</a></p>
    </div>",
            escape(reason)
        ),
    )
}
