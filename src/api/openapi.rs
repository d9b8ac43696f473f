use utoipa::OpenApi;

use crate::access::LimitDecision;
use crate::api::handlers::{
    bookmarks, exams, files, health, plans, questions, subjects, usage, users, webhooks,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        webhooks::identity_event,
        users::get_me,
        plans::list_plans,
        exams::create_exam,
        exams::list_exams,
        exams::get_exam,
        exams::update_exam,
        exams::toggle_pin,
        subjects::list_subjects,
        subjects::create_subject,
        subjects::get_subject,
        subjects::update_subject,
        subjects::delete_subject,
        questions::list_questions,
        questions::create_question,
        bookmarks::list_bookmarks,
        bookmarks::toggle_bookmark,
        files::list_files,
        files::create_file,
        files::mark_viewed,
        files::delete_file,
        usage::check_daily_limit,
        usage::increment_usage,
        usage::can_access_feature,
    ),
    components(schemas(
        health::Health,
        webhooks::IdentityEvent,
        users::UserResponse,
        plans::PlanResponse,
        exams::ExamResponse,
        exams::CreateExamRequest,
        exams::UpdateExamRequest,
        exams::PinResponse,
        subjects::SubjectResponse,
        subjects::CreateSubjectRequest,
        subjects::UpdateSubjectRequest,
        questions::QuestionResponse,
        questions::CreateQuestionRequest,
        bookmarks::BookmarkResponse,
        bookmarks::ToggleBookmarkRequest,
        bookmarks::ToggleBookmarkResponse,
        files::FileResponse,
        files::CreateFileRequest,
        usage::IncrementRequest,
        usage::FeatureVerdict,
        LimitDecision,
    )),
    tags(
        (name = "health", description = "Service and database health"),
        (name = "webhooks", description = "Identity provider lifecycle events"),
        (name = "users", description = "User profiles"),
        (name = "plans", description = "Subscription plan catalogue"),
        (name = "exams", description = "Exam catalogue"),
        (name = "subjects", description = "Subjects within an exam"),
        (name = "questions", description = "Question bank"),
        (name = "bookmarks", description = "Per-user bookmarks"),
        (name = "files", description = "File metadata"),
        (name = "usage", description = "Usage limits and feature gates"),
    )
)]
pub struct ApiDoc;
