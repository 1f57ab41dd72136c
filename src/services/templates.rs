//! HTML email templates for lending reminders

use chrono::{DateTime, Utc};

use crate::models::{LoanNotice, OverdueItem};

/// A rendered email
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; }
        .header { color: white; padding: 20px; text-align: center; border-radius: 8px 8px 0 0; }
        .upcoming { background-color: #4F46E5; }
        .overdue { background-color: #DC2626; }
        .content { background-color: #f9fafb; padding: 30px; border: 1px solid #e5e7eb; border-radius: 0 0 8px 8px; }
        .book { background-color: white; padding: 15px; margin: 15px 0; border-radius: 8px; border-left: 4px solid #DC2626; }
        .label { font-weight: bold; color: #6b7280; }
        .badge { background-color: #DC2626; color: white; padding: 4px 8px; border-radius: 4px; font-weight: bold; font-size: 12px; display: inline-block; }
        .note { background-color: #fef3c7; border-left: 4px solid #f59e0b; padding: 15px; margin: 20px 0; border-radius: 4px; }
        .footer { text-align: center; margin-top: 30px; color: #6b7280; font-size: 12px; }
"#;

const FOOTER: &str = "This is an automated message from BookLend. Please do not reply to this email.";

/// "Monday, March 10, 2024"
pub fn format_due_date(date: DateTime<Utc>) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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

fn plural(count: i64, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

fn page(header_class: &str, title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>{style}</style>
</head>
<body>
    <div class="header {header_class}"><h1>{title}</h1></div>
    <div class="content">
{content}
        <p>Thank you for using BookLend!</p>
    </div>
    <div class="footer"><p>{footer}</p></div>
</body>
</html>
"#,
        style = STYLE,
        header_class = header_class,
        title = title,
        content = content,
        footer = FOOTER,
    )
}

fn book_block(title: &str, author: Option<&str>, borrower: &str, due_label: &str, due_at: DateTime<Utc>) -> String {
    format!(
        r#"        <div class="book">
            <div><strong>{title}</strong></div>
            <div><span class="label">Author:</span> {author}</div>
            <div><span class="label">Lent to:</span> {borrower}</div>
            <div><span class="label">{due_label}:</span> {due}</div>
"#,
        title = escape(title),
        author = escape(author.unwrap_or("Unknown")),
        borrower = escape(borrower),
        due_label = due_label,
        due = format_due_date(due_at),
    )
}

/// Reminder sent a few days before a loan is due
pub fn upcoming_due(notice: &LoanNotice) -> RenderedEmail {
    let days = plural(notice.days, "day", "days");
    let mut content = format!(
        "        <h2>Book Due Soon</h2>\n        <p>A book you lent out is due in <strong>{}</strong>.</p>\n",
        days
    );
    content.push_str(&book_block(
        &notice.book_title,
        notice.book_author.as_deref(),
        &notice.borrower_name,
        "Due date",
        notice.due_at,
    ));
    content.push_str("        </div>\n");
    content.push_str(&format!(
        "        <div class=\"note\"><strong>Action needed:</strong> You may want to reach out to {} about the upcoming due date.</div>\n",
        escape(&notice.borrower_name)
    ));

    RenderedEmail {
        subject: "Reminder: Book due soon".to_string(),
        html: page("upcoming", "BookLend Reminder", &content),
        text: format!(
            "\"{}\" lent to {} is due in {} ({}).\n",
            notice.book_title,
            notice.borrower_name,
            days,
            format_due_date(notice.due_at)
        ),
    }
}

/// Single-loan overdue notice
pub fn overdue(notice: &LoanNotice) -> RenderedEmail {
    let mut content = String::from("        <h2>Book is Overdue</h2>\n        <p>A book you lent out is now overdue.</p>\n");
    content.push_str(&book_block(
        &notice.book_title,
        notice.book_author.as_deref(),
        &notice.borrower_name,
        "Was due",
        notice.due_at,
    ));
    content.push_str(&format!(
        "            <div><span class=\"badge\">OVERDUE BY {}</span></div>\n        </div>\n",
        plural(notice.days, "DAY", "DAYS")
    ));
    content.push_str(&format!(
        "        <div class=\"note\"><strong>Please follow up:</strong> We recommend contacting {} to request the return of this book.</div>\n",
        escape(&notice.borrower_name)
    ));

    RenderedEmail {
        subject: "Reminder: Book is overdue".to_string(),
        html: page("overdue", "BookLend Overdue Notice", &content),
        text: format!(
            "\"{}\" lent to {} was due {} and is overdue by {}.\n",
            notice.book_title,
            notice.borrower_name,
            format_due_date(notice.due_at),
            plural(notice.days, "day", "days")
        ),
    }
}

/// One email listing every overdue loan of an owner
pub fn overdue_digest(items: &[OverdueItem]) -> RenderedEmail {
    let total = items.len() as i64;
    let mut content = format!(
        "        <h2>You Have Overdue Books</h2>\n        <p>You have <strong>{}</strong> that {} currently overdue. Please follow up with the borrowers to request their return.</p>\n",
        plural(total, "book", "books"),
        if total == 1 { "is" } else { "are" }
    );
    let mut text = String::new();

    for item in items {
        content.push_str(&book_block(
            &item.book_title,
            item.book_author.as_deref(),
            &item.borrower_name,
            "Was due",
            item.due_at,
        ));
        content.push_str(&format!(
            "            <div><span class=\"badge\">OVERDUE BY {}</span></div>\n        </div>\n",
            plural(item.days_overdue, "DAY", "DAYS")
        ));
        text.push_str(&format!(
            "- \"{}\" lent to {}: overdue by {}\n",
            item.book_title,
            item.borrower_name,
            plural(item.days_overdue, "day", "days")
        ));
    }

    RenderedEmail {
        subject: format!("Reminder: You have {} overdue book(s)", total),
        html: page("overdue", "BookLend Overdue Notice", &content),
        text,
    }
}
