//! Static question banks used whenever generated questions are unavailable.

use crate::model::{InterviewSetup, InterviewType};

pub const GENERIC_DEFAULT: &[&str] = &[
    "Tell me about your background and experience.",
    "What are your strengths and weaknesses?",
    "Why are you interested in this position?",
];

const TECHNICAL_FRONTEND: &[&str] = &[
    "Can you explain how React's virtual DOM works?",
    "What's the difference between controlled and uncontrolled components in React?",
    "How would you optimize the performance of a React application?",
    "Explain how you would implement state management in a large React application.",
    "How do you handle API requests in a React application?",
];

const TECHNICAL_BACKEND: &[&str] = &[
    "Explain the concept of middleware in a backend framework.",
    "How would you design a scalable database schema for an e-commerce platform?",
    "What strategies would you use to ensure the security of a REST API?",
    "Explain the differences between SQL and NoSQL databases.",
    "How would you implement authentication and authorization in a web application?",
];

const TECHNICAL_FULLSTACK: &[&str] = &[
    "How do you ensure data consistency between frontend and backend?",
    "Explain your approach to debugging issues that span both frontend and backend.",
    "How would you implement real-time features in a web application?",
    "Describe your experience with containerization and deployment pipelines.",
    "How do you manage state in a complex application with multiple user roles?",
];

const TECHNICAL_GENERAL: &[&str] = &[
    "Explain the concept of object-oriented programming and its main principles.",
    "Explain how a binary search tree works and its time complexity.",
    "What is the difference between HTTP and HTTPS?",
    "Explain the concept of dependency injection and its benefits.",
    "How do you approach testing the code you write?",
];

const BEHAVIORAL: &[&str] = &[
    "Tell me about a challenging project you worked on and how you overcame obstacles.",
    "Describe a situation where you had to work under pressure to meet a deadline.",
    "How do you handle conflicts within a team?",
    "Can you give an example of a time when you had to adapt to a significant change at work?",
    "Tell me about a time when you failed at something. How did you handle it?",
];

const SYSTEM_DESIGN: &[&str] = &[
    "How would you design a URL shortening service like bit.ly?",
    "Design a distributed cache system.",
    "How would you design Twitter's news feed functionality?",
    "Design a content delivery network (CDN).",
    "How would you design a real-time chat application?",
];

const BUSINESS: &[&str] = &[
    "How would you approach entering a new market segment?",
    "Describe your approach to developing a business strategy.",
    "How would you handle a situation where your company is facing declining sales?",
    "Explain your approach to managing a business transformation.",
    "How would you evaluate a potential business acquisition?",
];

const MARKETING: &[&str] = &[
    "How would you develop a marketing strategy for a new product launch?",
    "Describe your approach to content marketing.",
    "How would you approach social media marketing for a B2B company?",
    "Explain your approach to email marketing campaigns.",
    "How would you develop a brand identity for a new company?",
];

const FINANCE: &[&str] = &[
    "How would you approach financial planning for a startup?",
    "Explain your approach to investment portfolio management.",
    "How would you evaluate the financial health of a company?",
    "Describe your approach to financial risk management.",
    "How would you approach tax planning for a business?",
];

const GOOGLE: &[&str] = &[
    "How would you improve Google Search?",
    "Tell me about a time you had to make a decision with insufficient information.",
];

const MICROSOFT: &[&str] = &[
    "How would you implement a feature for Microsoft Teams?",
    "Describe your approach to ensuring accessibility in software.",
];

const AMAZON: &[&str] = &[
    "How do you think about customer obsession in your work?",
    "Tell me about a time you had to make a decision that wasn't popular.",
];

const APPLE: &[&str] = &[
    "How would you balance innovation with user experience?",
    "Describe a time when you had to simplify a complex design.",
];

/// Which lookup produced the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankTier {
    RoleSpecific,
    InterviewType,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankSelection {
    pub tier: BankTier,
    pub questions: &'static [&'static str],
}

/// Picks the most specific bank for the setup: interview type and role first,
/// then interview type alone, then the generic default.
pub fn select(setup: &InterviewSetup) -> BankSelection {
    if let Some(questions) = role_bank(&setup.interview_type, &setup.role) {
        return BankSelection {
            tier: BankTier::RoleSpecific,
            questions,
        };
    }
    if let Some(questions) = type_bank(&setup.interview_type) {
        return BankSelection {
            tier: BankTier::InterviewType,
            questions,
        };
    }
    BankSelection {
        tier: BankTier::Generic,
        questions: GENERIC_DEFAULT,
    }
}

pub fn company_questions(company: &str) -> &'static [&'static str] {
    match company.trim().to_lowercase().as_str() {
        "google" => GOOGLE,
        "microsoft" => MICROSOFT,
        "amazon" => AMAZON,
        "apple" => APPLE,
        _ => &[],
    }
}

fn role_bank(interview_type: &InterviewType, role: &str) -> Option<&'static [&'static str]> {
    if *interview_type != InterviewType::Technical {
        return None;
    }
    let role: String = role
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if role.contains("fullstack") {
        Some(TECHNICAL_FULLSTACK)
    } else if role.contains("frontend") {
        Some(TECHNICAL_FRONTEND)
    } else if role.contains("backend") {
        Some(TECHNICAL_BACKEND)
    } else {
        None
    }
}

fn type_bank(interview_type: &InterviewType) -> Option<&'static [&'static str]> {
    match interview_type {
        InterviewType::Technical => Some(TECHNICAL_GENERAL),
        InterviewType::Behavioral => Some(BEHAVIORAL),
        InterviewType::SystemDesign => Some(SYSTEM_DESIGN),
        InterviewType::Business => Some(BUSINESS),
        InterviewType::Marketing => Some(MARKETING),
        InterviewType::Finance => Some(FINANCE),
        InterviewType::Other(_) => None,
    }
}
