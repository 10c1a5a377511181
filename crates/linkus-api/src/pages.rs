//! Static HTML returned by the email verification link.

pub fn verification_success(login_url: &str) -> String {
    page(
        "Email verified",
        "#28a745",
        "Your email address has been verified. You can now log in to LinkUs.",
        login_url,
        "Go to login",
    )
}

pub fn verification_failed(login_url: &str) -> String {
    page(
        "Verification failed",
        "#dc3545",
        "This verification link is invalid or has already been used.",
        login_url,
        "Back to login",
    )
}

pub fn server_error(login_url: &str) -> String {
    page(
        "Something went wrong",
        "#dc3545",
        "We could not verify your email right now. Please try again later.",
        login_url,
        "Back to login",
    )
}

fn page(title: &str, color: &str, body: &str, link: &str, link_text: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{title} - LinkUs</title>
</head>
<body style="font-family: Arial, sans-serif; text-align: center; padding: 50px;">
  <h1 style="color: {color};">{title}</h1>
  <p>{body}</p>
  <a href="{link}" style="background-color: #007bff; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px;">{link_text}</a>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_link_to_login() {
        let url = "http://localhost:3000/login";
        for html in [verification_success(url), verification_failed(url), server_error(url)] {
            assert!(html.starts_with("<!DOCTYPE html>"));
            assert!(html.contains(r#"href="http://localhost:3000/login""#));
        }
        assert!(verification_success(url).contains("Email verified"));
    }
}
