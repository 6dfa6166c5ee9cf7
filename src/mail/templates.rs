use super::Email;

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn refund_notice(to: &str, title: &str, amount: f64) -> Email {
    Email {
        to: to.to_string(),
        subject: "Book Reservation Refund".into(),
        html: format!(
            "<p>Hello,</p>\
             <p>We regret to inform you that the book <strong>{}</strong> which you had \
             reserved is no longer available as it was marked lost.</p>\
             <p>A refund of <strong>{:.2}</strong> is being processed to your account.</p>\
             <p>Thank you for your understanding.</p>",
            escape(title),
            amount
        ),
    }
}

pub fn password_reset(to: &str, link: &str) -> Email {
    let link = escape(link);
    Email {
        to: to.to_string(),
        subject: "Password Reset Request".into(),
        html: format!(
            "<p>Hello,</p>\
             <p>We received a request to reset your password.</p>\
             <p>Please click the link below to set a new password:</p>\
             <p><a href=\"{link}\">{link}</a></p>\
             <p>If you did not request this, please ignore this email.</p>"
        ),
    }
}

pub fn welcome(to: &str, name: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Welcome to the Library Management System!".into(),
        html: format!(
            "<div style=\"font-family: sans-serif; color: #333;\">\
             <h2>Hi {},</h2>\
             <p>Welcome to our Library Management System!</p>\
             <p>Explore a wide collection of books and digital resources now available to you.</p>\
             <p>Happy Reading!</p>\
             <p style=\"margin-top: 20px;\">Library Management Team</p>\
             </div>",
            escape(name)
        ),
    }
}
