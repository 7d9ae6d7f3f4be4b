use anyhow::{anyhow, Result};
use url::Url;

/// Validate that a string is a valid URL with http or https scheme
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str)
        .map_err(|e| anyhow!("Invalid URL format: {}", e))?;

    // Only allow http and https schemes
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow!(
            "URL must use http or https scheme, got: {}",
            url.scheme()
        ));
    }

    // Must have a host
    if url.host_str().is_none() {
        return Err(anyhow!("URL must have a host"));
    }

    Ok(url)
}

/// Validate and normalize an email address (trimmed, lowercased)
pub fn validate_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| anyhow!("Email must contain '@'"))?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(anyhow!("Invalid email address"));
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(anyhow!("Invalid email domain"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(anyhow!("Email must not contain whitespace"));
    }

    Ok(email)
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < 8 {
        return Err(anyhow!("Password must be at least 8 characters"));
    }
    if password.len() > 72 {
        // bcrypt only looks at the first 72 bytes
        return Err(anyhow!("Password must be at most 72 bytes"));
    }
    Ok(())
}

/// Validate a display name (habit, trait); returns the trimmed value
pub fn validate_name(name: &str, field: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("{} must not be empty", field));
    }
    if name.chars().count() > 100 {
        return Err(anyhow!("{} must be at most 100 characters", field));
    }
    Ok(name.to_string())
}

/// Validate a `#rrggbb` color; returns it lowercased
pub fn validate_hex_color(color: &str) -> Result<String> {
    let color = color.trim();
    let hex = color
        .strip_prefix('#')
        .ok_or_else(|| anyhow!("Color must start with '#'"))?;

    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("Color must look like #rrggbb, got: {}", color));
    }

    Ok(color.to_lowercase())
}

/// Lowercase, dash-separated slug built from a name
pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;

    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 {
        return Err(anyhow!("Slug must be between 1 and 64 characters"));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(anyhow!(
            "Slug can only contain lowercase letters, digits and hyphens"
        ));
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err(anyhow!("Slug must not start or end with a hyphen"));
    }
    Ok(())
}
