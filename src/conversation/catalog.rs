use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub native_name: &'static str,
    pub flag: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Topic {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    pub category: &'static str,
}

pub const LANGUAGES: &[Language] = &[
    Language { code: "it", name: "Italian", native_name: "Italiano", flag: "🇮🇹" },
    Language { code: "es", name: "Spanish", native_name: "Español", flag: "🇪🇸" },
    Language { code: "pt", name: "Portuguese", native_name: "Português", flag: "🇧🇷" },
    Language { code: "fr", name: "French", native_name: "Français", flag: "🇫🇷" },
    Language { code: "de", name: "German", native_name: "Deutsch", flag: "🇩🇪" },
];

const fn topic(
    id: &'static str,
    name: &'static str,
    icon: &'static str,
    description: &'static str,
    category: &'static str,
) -> Topic {
    Topic { id, name, icon, description, category }
}

pub const TOPICS: &[Topic] = &[
    topic("general", "General Conversation", "💬", "Everyday small talk, greetings, and casual chat", "Everyday Life"),
    topic("daily-recap", "Daily Recap", "📅", "Recap your day, share stories and experiences", "Everyday Life"),
    topic("future-plans", "Future Plans", "🗓️", "Discuss upcoming events, dreams, and goals", "Everyday Life"),
    topic("home", "Home & Living", "🏠", "Household topics, décor, and neighborhoods", "Everyday Life"),
    topic("family", "Family & Relationships", "👨‍👩‍👧", "Talk about family, friends, and relationships", "Social"),
    topic("food-dining", "Food & Dining", "🍽️", "Restaurants, ordering food, recipes, and cuisine", "Social"),
    topic("shopping", "Shopping", "🛍️", "Stores, markets, prices, and fashion", "Social"),
    topic("travel", "Travel & Tourism", "✈️", "Directions, hotels, airports, and sightseeing", "Travel & Leisure"),
    topic("sports", "Sports & Fitness", "⚽", "Sports, teams, gym routines, and exercise", "Travel & Leisure"),
    topic("entertainment", "Entertainment", "🎬", "TV, movies, music, gaming, and pop culture", "Travel & Leisure"),
    topic("culture", "Culture & Arts", "🎭", "Art, music, literature, festivals, and traditions", "Travel & Leisure"),
    topic("environment", "Environment & Nature", "🌿", "Weather, ecology, and outdoor activities", "Travel & Leisure"),
    topic("health", "Health & Wellness", "🏥", "Doctor visits, fitness, symptoms, and well-being", "Health & Learning"),
    topic("education", "Education & Learning", "📚", "School, courses, studying, and academic life", "Health & Learning"),
    topic("work", "Work & Career", "💼", "Job interviews, workplace, and career development", "Professional"),
    topic("technology", "Technology", "💻", "Tech talk, software, devices, and digital life", "Professional"),
    topic("cloud", "Cloud Computing", "☁️", "Cloud services, DevOps, Kubernetes, and infrastructure", "Professional"),
    topic("marketing", "Marketing & Business", "📊", "Campaigns, branding, sales, and business strategy", "Professional"),
    topic("finance", "Finance & Banking", "💰", "Money, investments, banking, and economics", "Professional"),
    topic("news", "News & Current Events", "📰", "Discussing news, politics, and world affairs", "Professional"),
];

pub fn find_language(code: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|l| l.code == code)
}

pub fn find_topic(id: &str) -> Option<&'static Topic> {
    TOPICS.iter().find(|t| t.id == id)
}

/// English name of a language code; unknown codes read as Italian.
pub fn language_name(code: &str) -> &'static str {
    find_language(code).map(|l| l.name).unwrap_or("Italian")
}

/// Name and description of a topic, with a generic fallback.
pub fn topic_details(id: &str) -> (&'static str, &'static str) {
    find_topic(id)
        .map(|t| (t.name, t.description))
        .unwrap_or(("General Conversation", "Everyday casual conversation"))
}

pub async fn get_languages() -> Json<&'static [Language]> {
    Json(LANGUAGES)
}

pub async fn get_topics() -> Json<&'static [Topic]> {
    Json(TOPICS)
}
