//! Fixtures for tests in this crate and in the lambda crate.

use crate::store::{CatalogStore, MemoryStore, UserStore};
use crate::types::{Course, Lecture, Role, User, Year};

pub fn user(user_id: &str, role: Role) -> User {
    User {
        user_id: user_id.to_string(),
        full_name: format!("User {}", user_id),
        email: format!("{}@uni.example", user_id),
        role,
        enrolled_courses: Vec::new(),
        profile_completed: false,
        avatar_url: None,
        created_at: "2024-01-01T00:00:00+00:00".to_string(),
    }
}

pub fn lecture(lecture_id: &str, order: Option<u32>) -> Lecture {
    Lecture {
        lecture_id: lecture_id.to_string(),
        title: format!("Lecture {}", lecture_id),
        description: String::new(),
        video_url: format!("https://www.youtube.com/watch?v={}", lecture_id),
        duration: "10:00".to_string(),
        order,
        thumbnail: None,
    }
}

pub async fn seed_user(store: &MemoryStore, user_id: &str, role: Role) -> User {
    let user = user(user_id, role);
    store.create_user(&user).await.unwrap();
    user
}

/// Course `course_id` with lectures `{course_id}-l0 ..` in canonical order.
pub async fn seed_course(
    store: &MemoryStore,
    course_id: &str,
    year: u8,
    topics: &[&str],
    lecture_count: u32,
) -> Course {
    let lectures: Vec<Lecture> = (0..lecture_count)
        .map(|i| lecture(&format!("{}-l{}", course_id, i), Some(i)))
        .collect();
    let course = Course {
        course_id: course_id.to_string(),
        title: format!("Course {}", course_id),
        description: String::new(),
        category: "Computer Science".to_string(),
        year: Year::try_from(year).unwrap(),
        topics: topics.iter().map(|t| t.to_string()).collect(),
        lectures_order: lectures.iter().map(|l| l.lecture_id.clone()).collect(),
        total_lectures: lecture_count,
        thumbnail: None,
        created_at: "2024-01-01T00:00:00+00:00".to_string(),
        updated_at: None,
    };
    store.create_course(&course, &lectures).await.unwrap();
    course
}
