pub struct NotificationTemplates;

impl NotificationTemplates {
    /// HTML email sent to the emergency contact when a check-in call was
    /// missed.
    pub fn missed_checkin_email(
        recipient_name: &str,
        contact_name: &str,
        missed_at: &str,
    ) -> String {
        format!(
            r#"
<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: 'Helvetica Neue', Helvetica, Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #ddd; border-radius: 8px; }}
        .header {{ background-color: #dfe6e9; padding: 15px; border-radius: 8px 8px 0 0; text-align: center; }}
        .header h1 {{ margin: 0; color: #2d3436; }}
        .content {{ padding: 20px; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #b2bec3; text-align: center; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>CareCall Check-In Missed</h1>
        </div>
        <div class="content">
            <p>Hello {contact_name},</p>
            <p><strong>{recipient_name}</strong> did not answer their scheduled
            wellness check-in call at {missed_at} (UTC).</p>
            <p>We have sent them a text message. You may want to reach out
            directly to make sure everything is okay.</p>
        </div>
        <div class="footer">
            <p>Sent by CareCall Wellness Check-Ins</p>
        </div>
    </div>
</body>
</html>
"#,
            contact_name = contact_name,
            recipient_name = recipient_name,
            missed_at = missed_at,
        )
    }

    /// HTML email carrying the four-digit login code.
    pub fn login_code_email(code: &str) -> String {
        format!(
            r#"
<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: 'Helvetica Neue', Helvetica, Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #ddd; border-radius: 8px; }}
        .code {{ font-size: 32px; letter-spacing: 8px; text-align: center; font-weight: bold; margin: 20px 0; }}
        .footer {{ margin-top: 30px; font-size: 12px; color: #b2bec3; text-align: center; }}
    </style>
</head>
<body>
    <div class="container">
        <p>Your CareCall verification code is:</p>
        <div class="code">{code}</div>
        <p>This code expires in 10 minutes. If you did not request it, you can
        ignore this email.</p>
        <div class="footer">
            <p>Sent by CareCall Wellness Check-Ins</p>
        </div>
    </div>
</body>
</html>
"#,
            code = code,
        )
    }
}
