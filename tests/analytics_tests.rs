// tests/analytics_tests.rs

mod common;

use common::{SeedResult, TestApp, create_course, create_user, enroll, insert_result, spawn_app};
use serde_json::{Value, json};

/// Two groups of three learners: A scores 80/85/90 and B scores 60/65/70 on
/// "Part A", one attempt each.
async fn seed_two_groups(app: &TestApp) -> (i64, Vec<i64>) {
    let course = create_course(&app.pool, "Vocab 101", "A,B", "[]").await;
    let mut users = Vec::new();
    for (i, (group, score, mental)) in [
        ("A", 80.0, 40.0),
        ("A", 85.0, 50.0),
        ("A", 90.0, 45.0),
        ("B", 60.0, 70.0),
        ("B", 65.0, 65.0),
        ("B", 70.0, 75.0),
    ]
    .into_iter()
    .enumerate()
    {
        let user = create_user(&app.pool, &format!("s{}@lab.test", i)).await;
        enroll(&app.pool, user, course, group).await;
        insert_result(
            &app.pool,
            SeedResult {
                user_id: user,
                course_id: course,
                attempt: 1,
                group: Some(group),
                sections: json!({ "Part A": score }),
                mental,
                deleted: false,
            },
        )
        .await;
        users.push(user);
    }
    (course, users)
}

async fn get_json(app: &TestApp, path: &str, token: &str) -> Value {
    let response = app.get(path, token).await;
    assert_eq!(response.status().as_u16(), 200, "GET {}", path);
    response.json().await.unwrap()
}

#[tokio::test]
async fn admin_stats_compare_two_groups_with_rank_sum() {
    let app = spawn_app().await;
    let (course, _) = seed_two_groups(&app).await;
    let token = app.admin_token().await;

    let body = get_json(&app, &format!("/api/admin/stats?course_id={}", course), &token).await;

    let part_a = &body["stats"]["Part A"];
    assert_eq!(part_a["test"], "Wilcoxon Rank-Sum");
    let p = part_a["p_value"].as_f64().unwrap();
    assert!(p > 0.0 && p < 0.1);
    assert_eq!(part_a["groups"].as_array().unwrap().len(), 2);

    let plot = body["plots"]["Part A"].as_str().unwrap();
    assert!(plot.starts_with("iVBORw0KGgo"));
    assert!(
        body["interpretations"]["Part A"]
            .as_str()
            .unwrap()
            .starts_with("Method: Wilcoxon Rank-Sum.")
    );
    // Duration and NASA metrics are analysed alongside the sections.
    assert!(body["stats"]["Total Duration"].is_object());
    assert!(body["stats"]["NASA: Mental"].is_object());
}

#[tokio::test]
async fn soft_deleted_results_are_ignored() {
    let app = spawn_app().await;
    let (course, _) = seed_two_groups(&app).await;
    let outlier = create_user(&app.pool, "outlier@lab.test").await;
    enroll(&app.pool, outlier, course, "C").await;
    insert_result(
        &app.pool,
        SeedResult {
            user_id: outlier,
            course_id: course,
            attempt: 1,
            group: Some("C"),
            sections: json!({ "Part A": 0.0, "Part Z": 10.0 }),
            mental: 100.0,
            deleted: true,
        },
    )
    .await;
    let token = app.admin_token().await;

    let body = get_json(&app, &format!("/api/admin/stats?course_id={}", course), &token).await;

    assert_eq!(body["stats"]["Part A"]["test"], "Wilcoxon Rank-Sum");
    assert!(body["stats"].get("Part Z").is_none());
}

#[tokio::test]
async fn single_group_reports_insufficient_data() {
    let app = spawn_app().await;
    let course = create_course(&app.pool, "Solo", "A", "[]").await;
    for i in 0..3 {
        let user = create_user(&app.pool, &format!("solo{}@lab.test", i)).await;
        insert_result(
            &app.pool,
            SeedResult {
                user_id: user,
                course_id: course,
                attempt: 1,
                group: Some("A"),
                sections: json!({ "Part A": 50.0 + i as f64 }),
                mental: 50.0,
                deleted: false,
            },
        )
        .await;
    }
    let token = app.admin_token().await;

    let body = get_json(&app, &format!("/api/admin/stats?course_id={}", course), &token).await;

    assert!(body["stats"].get("Part A").is_none());
    assert!(
        body["interpretations"]["Part A"]
            .as_str()
            .unwrap()
            .starts_with("Unable to perform analysis: Insufficient data")
    );
}

#[tokio::test]
async fn course_without_results_answers_with_error_object() {
    let app = spawn_app().await;
    let course = create_course(&app.pool, "Empty", "A,B", "[]").await;
    let token = app.admin_token().await;

    let body = get_json(&app, &format!("/api/admin/stats?course_id={}", course), &token).await;

    assert!(body["error"].is_string());
}

#[tokio::test]
async fn learner_stats_need_enrollment() {
    let app = spawn_app().await;
    let (course, users) = seed_two_groups(&app).await;
    let stranger = create_user(&app.pool, "stranger@lab.test").await;

    let denied = app
        .get(&format!("/api/analytics/{}/stats", course), &app.token(stranger, false))
        .await;
    assert_eq!(denied.status().as_u16(), 403);

    let body = get_json(
        &app,
        &format!("/api/analytics/{}/stats", course),
        &app.token(users[0], false),
    )
    .await;
    assert!(body["plots"]["Part A"].is_string());
}

#[tokio::test]
async fn attempts_are_listed_without_deleted_ones() {
    let app = spawn_app().await;
    let (course, users) = seed_two_groups(&app).await;
    for (attempt, deleted) in [(2, false), (3, true)] {
        insert_result(
            &app.pool,
            SeedResult {
                user_id: users[0],
                course_id: course,
                attempt,
                group: Some("A"),
                sections: json!({ "Part A": 95.0 }),
                mental: 40.0,
                deleted,
            },
        )
        .await;
    }
    let token = app.admin_token().await;

    let body = get_json(&app, &format!("/api/admin/courses/{}/attempts", course), &token).await;

    assert_eq!(body["attempts"], json!([1, 2]));
}

#[tokio::test]
async fn identical_attempts_show_no_change_over_time() {
    let app = spawn_app().await;
    let course = create_course(&app.pool, "Repeat", "A,B", "[]").await;
    for i in 0..4 {
        let user = create_user(&app.pool, &format!("r{}@lab.test", i)).await;
        enroll(&app.pool, user, course, if i % 2 == 0 { "A" } else { "B" }).await;
        for attempt in 1..=2 {
            insert_result(
                &app.pool,
                SeedResult {
                    user_id: user,
                    course_id: course,
                    attempt,
                    group: None,
                    sections: json!({ "Part A": 60.0 + 10.0 * i as f64 }),
                    mental: 50.0,
                    deleted: false,
                },
            )
            .await;
        }
    }
    let token = app.admin_token().await;

    let body = get_json(
        &app,
        &format!("/api/admin/time_series?course_id={}&attempts=1,2", course),
        &token,
    )
    .await;

    assert_eq!(body["available_attempts"], json!([1, 2]));
    let sections = body["sections"].as_array().unwrap();
    let part_a = sections.iter().find(|s| s["name"] == "Part A").unwrap();
    assert_eq!(part_a["stats"]["test"], "Wilcoxon Signed-Rank");
    assert_eq!(part_a["stats"]["p_value"].as_f64(), Some(1.0));
    assert_eq!(part_a["stats"]["significant"], false);
    assert_eq!(part_a["table_data"].as_array().unwrap().len(), 2);
    assert!(part_a["plot"].as_str().unwrap().starts_with("iVBORw0KGgo"));
}

#[tokio::test]
async fn efficiency_analysis_standardizes_overall_first() {
    let app = spawn_app().await;
    let (course, _) = seed_two_groups(&app).await;
    let token = app.admin_token().await;

    let body = get_json(
        &app,
        &format!("/api/admin/efficiency_analysis?course_id={}", course),
        &token,
    )
    .await;

    let sections = body["sections"].as_array().unwrap();
    assert_eq!(sections[0]["section"], "Overall");
    let points = sections[0]["individual_points"].as_array().unwrap();
    assert_eq!(points.len(), 6);
    let z_sum: f64 = points.iter().map(|p| p["Z_P"].as_f64().unwrap()).sum();
    assert!(z_sum.abs() < 1e-9);
    assert!(sections[0].get("plot").is_none());
    assert_eq!(
        sections[0]["statistics"]["comparison"]["test"],
        "Wilcoxon Rank-Sum"
    );
}

#[tokio::test]
async fn user_efficiency_plot_classifies_the_learner() {
    let app = spawn_app().await;
    let (course, users) = seed_two_groups(&app).await;

    // Highest score with the lowest effort in the cohort.
    let body = get_json(
        &app,
        &format!("/api/analytics/{}/efficiency_plot", course),
        &app.token(users[0], false),
    )
    .await;
    assert!(body["image"].as_str().unwrap().starts_with("data:image/png;base64,"));
    assert_eq!(body["user_data"]["user_id"], users[0]);
    assert!(body["quadrant"].is_string());

    let token = app.admin_token().await;
    let missing = get_json(
        &app,
        &format!("/api/admin/user_efficiency_plot?course_id={}&user_id=9999", course),
        &token,
    )
    .await;
    assert!(missing["error"].is_string());
}

#[tokio::test]
async fn nasa_radar_reads_latest_attempt() {
    let app = spawn_app().await;
    let (course, users) = seed_two_groups(&app).await;
    insert_result(
        &app.pool,
        SeedResult {
            user_id: users[1],
            course_id: course,
            attempt: 2,
            group: Some("A"),
            sections: json!({ "Part A": 88.0 }),
            mental: 12.0,
            deleted: false,
        },
    )
    .await;

    let body = get_json(
        &app,
        &format!("/api/analytics/{}/nasa_radar", course),
        &app.token(users[1], false),
    )
    .await;

    assert_eq!(body["mental"].as_f64(), Some(12.0));
    assert_eq!(body["frustration"].as_f64(), Some(10.0));
}

#[tokio::test]
async fn nasa_radar_shows_zeros_for_unreadable_ratings() {
    let app = spawn_app().await;
    let (course, users) = seed_two_groups(&app).await;
    let id = insert_result(
        &app.pool,
        SeedResult {
            user_id: users[2],
            course_id: course,
            attempt: 2,
            group: Some("A"),
            sections: json!({ "Part A": 70.0 }),
            mental: 30.0,
            deleted: false,
        },
    )
    .await;
    sqlx::query("UPDATE quiz_results SET nasa_details_json = '{not json' WHERE id = ?")
        .bind(id)
        .execute(&app.pool)
        .await
        .unwrap();

    let body = get_json(
        &app,
        &format!("/api/analytics/{}/nasa_radar", course),
        &app.token(users[2], false),
    )
    .await;

    assert_eq!(body["mental"].as_f64(), Some(0.0));
    assert_eq!(body["frustration"].as_f64(), Some(0.0));
}

#[tokio::test]
async fn engagement_and_image_analytics() {
    let app = spawn_app().await;
    let (course, users) = seed_two_groups(&app).await;
    let (vocab,): (i64,) = sqlx::query_as(
        "INSERT INTO vocabulary (course_id, word, chinese_meaning) VALUES (?, 'lament', '哀悼') RETURNING id",
    )
    .bind(course)
    .fetch_one(&app.pool)
    .await
    .unwrap();

    // Every learner views twice; A learners also like.
    for (i, user) in users.iter().enumerate() {
        let token = app.token(*user, false);
        let mut actions = vec!["view", "view"];
        if i < 3 {
            actions.push("like");
        }
        for action in actions {
            let response = app
                .post(
                    "/api/interactions",
                    &token,
                    json!({
                        "image_url": "/static/uploads/lament.png",
                        "action": action,
                        "course_id": course,
                        "vocab_id": vocab
                    }),
                )
                .await;
            assert_eq!(response.status().as_u16(), 201);
        }
    }
    let token = app.admin_token().await;

    let engagement = get_json(
        &app,
        &format!("/api/admin/engagement_analysis?course_id={}", course),
        &token,
    )
    .await;
    let learners = engagement["individual_data"].as_array().unwrap();
    assert_eq!(learners.len(), 6);
    assert_eq!(engagement["statistics"]["test"], "Wilcoxon Rank-Sum");
    assert!(engagement.get("image").is_none());

    let plotted = get_json(
        &app,
        &format!("/api/admin/engagement_plot?course_id={}", course),
        &token,
    )
    .await;
    assert!(plotted["image"].as_str().unwrap().starts_with("data:image/png;base64,"));

    let images = get_json(
        &app,
        &format!("/api/admin/image_analytics?course_id={}", course),
        &token,
    )
    .await;
    let first = &images["analytics"][0];
    assert_eq!(first["word"], "lament");
    assert_eq!(first["views"], 12);
    assert_eq!(first["likes"], 3);
    assert_eq!(first["unique_viewers"], 6);
}

fn group_mean(comparison: &Value, group: &str) -> (f64, u64) {
    let summary = comparison["groups"]
        .as_array()
        .unwrap()
        .iter()
        .find(|g| g["group"] == group)
        .unwrap();
    (summary["mean"].as_f64().unwrap(), summary["count"].as_u64().unwrap())
}

#[tokio::test]
async fn target_attempt_scopes_the_comparison() {
    let app = spawn_app().await;
    let (course, users) = seed_two_groups(&app).await;
    // Second attempt flips the ranking: A drops to 50-60, B rises to 90-100.
    for (i, user) in users.iter().enumerate() {
        let (group, score) = if i < 3 {
            ("A", 50.0 + 5.0 * i as f64)
        } else {
            ("B", 90.0 + 5.0 * (i - 3) as f64)
        };
        insert_result(
            &app.pool,
            SeedResult {
                user_id: *user,
                course_id: course,
                attempt: 2,
                group: Some(group),
                sections: json!({ "Part A": score }),
                mental: 50.0,
                deleted: false,
            },
        )
        .await;
    }
    let token = app.admin_token().await;

    let second = get_json(
        &app,
        &format!("/api/admin/stats?course_id={}&target_attempt=2", course),
        &token,
    )
    .await;
    let (a_mean, a_count) = group_mean(&second["stats"]["Part A"], "A");
    let (b_mean, b_count) = group_mean(&second["stats"]["Part A"], "B");
    assert_eq!((a_count, b_count), (3, 3));
    assert!((a_mean - 55.0).abs() < 1e-9);
    assert!((b_mean - 95.0).abs() < 1e-9);

    let first = get_json(
        &app,
        &format!("/api/admin/stats?course_id={}&target_attempt=1", course),
        &token,
    )
    .await;
    let (a_mean, a_count) = group_mean(&first["stats"]["Part A"], "A");
    assert_eq!(a_count, 3);
    assert!((a_mean - 85.0).abs() < 1e-9);

    // The learner view honours the same scope.
    let learner = get_json(
        &app,
        &format!("/api/analytics/{}/stats?target_attempt=2", course),
        &app.token(users[0], false),
    )
    .await;
    let (b_mean, _) = group_mean(&learner["stats"]["Part A"], "B");
    assert!((b_mean - 95.0).abs() < 1e-9);

    let unmatched = get_json(
        &app,
        &format!("/api/admin/stats?course_id={}&target_attempt=9", course),
        &token,
    )
    .await;
    assert_eq!(unmatched["error"], "No data available for this course");
    assert!(unmatched.get("stats").is_none());

    let no_efficiency = get_json(
        &app,
        &format!("/api/admin/efficiency_analysis?course_id={}&target_attempt=9", course),
        &token,
    )
    .await;
    assert!(no_efficiency["error"].is_string());
}

#[tokio::test]
async fn efficiency_plot_renders_every_section() {
    let app = spawn_app().await;
    let (course, _) = seed_two_groups(&app).await;
    // Part B is only taken by four learners.
    for (i, (group, score)) in [("A", 70.0), ("A", 75.0), ("B", 95.0), ("B", 90.0)].into_iter().enumerate() {
        let user = create_user(&app.pool, &format!("b{}@lab.test", i)).await;
        enroll(&app.pool, user, course, group).await;
        insert_result(
            &app.pool,
            SeedResult {
                user_id: user,
                course_id: course,
                attempt: 1,
                group: Some(group),
                sections: json!({ "Part B": score }),
                mental: 50.0,
                deleted: false,
            },
        )
        .await;
    }
    let token = app.admin_token().await;

    let body = get_json(
        &app,
        &format!("/api/admin/efficiency_plot?course_id={}", course),
        &token,
    )
    .await;

    let sections = body["sections"].as_array().unwrap();
    let names: Vec<&str> = sections.iter().map(|s| s["section"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Overall", "Part A", "Part B"]);
    for section in sections {
        let plot = section["plot"].as_str().unwrap();
        assert!(plot.starts_with("data:image/png;base64,iVBOR"), "{}", section["section"]);
    }
    let count = |i: usize| sections[i]["individual_points"].as_array().unwrap().len();
    assert_eq!((count(0), count(1), count(2)), (10, 6, 4));
}
