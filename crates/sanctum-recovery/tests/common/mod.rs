//! Shared fixtures for the integration suites: a five-question set with
//! `q3` as the keystone, reduced-cost KDF parameters, and a guard with a
//! near-zero response delay.

use sanctum_recovery::{
    Answer, AttemptLimiter, GuardConfig, KdfParams, SecurityQuestion, SideChannelGuard,
};
use std::sync::Arc;

pub fn test_kdf() -> KdfParams {
    KdfParams {
        m_cost: 1024,
        t_cost: 1,
        p_cost: 1,
    }
}

pub fn questions() -> Vec<SecurityQuestion> {
    vec![
        SecurityQuestion::new("q1", "First pet's name?", false),
        SecurityQuestion::new("q2", "Street you grew up on?", false),
        SecurityQuestion::new("q3", "Mother's birthplace?", true),
        SecurityQuestion::new("q4", "First concert?", false),
        SecurityQuestion::new("q5", "Childhood best friend?", false),
    ]
}

pub fn answer(id: &str) -> Answer {
    let text = match id {
        "q1" => "fluffy",
        "q2" => "elm street",
        "q3" => "lisbon",
        "q4" => "the cure",
        "q5" => "sam",
        _ => panic!("unknown test question '{id}'"),
    };
    Answer::new(id, text)
}

pub fn all_answers() -> Vec<Answer> {
    ["q1", "q2", "q3", "q4", "q5"].map(answer).to_vec()
}

pub fn new_questions() -> Vec<SecurityQuestion> {
    vec![
        SecurityQuestion::new("n1", "Favorite subject in school?", false),
        SecurityQuestion::new("n2", "First car?", true),
        SecurityQuestion::new("n3", "Childhood nickname?", false),
        SecurityQuestion::new("n4", "City of first job?", false),
        SecurityQuestion::new("n5", "Grandmother's first name?", false),
    ]
}

pub fn new_answer(id: &str) -> Answer {
    let text = match id {
        "n1" => "mrs chen",
        "n2" => "corolla",
        "n3" => "ziggy",
        "n4" => "porto",
        "n5" => "maria",
        _ => panic!("unknown test question '{id}'"),
    };
    Answer::new(id, text)
}

pub fn all_new_answers() -> Vec<Answer> {
    ["n1", "n2", "n3", "n4", "n5"].map(new_answer).to_vec()
}

pub fn fast_guard() -> SideChannelGuard {
    SideChannelGuard::new(
        Arc::new(AttemptLimiter::new()),
        GuardConfig {
            delay_min_ms: 0,
            delay_max_ms: 1,
            ..GuardConfig::default()
        },
    )
}
