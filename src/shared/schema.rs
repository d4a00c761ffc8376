diesel::table! {
    activity_events (id) {
        id -> Uuid,
        org_id -> Nullable<Uuid>,
        user_id -> Uuid,
        event_type -> Varchar,
        source_type -> Varchar,
        source_id -> Text,
        score -> Nullable<Float8>,
        skill_ids -> Array<Nullable<Uuid>>,
        payload -> Jsonb,
        occurred_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    skill_impact_events (id) {
        id -> Uuid,
        org_id -> Nullable<Uuid>,
        user_id -> Uuid,
        skill_id -> Uuid,
        source_type -> Varchar,
        source_id -> Nullable<Text>,
        impact_type -> Varchar,
        impact_value -> Float8,
        normalized_score -> Nullable<Float8>,
        metadata -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    development_plans (id) {
        id -> Uuid,
        org_id -> Nullable<Uuid>,
        user_id -> Uuid,
        title -> Text,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    development_goals (id) {
        id -> Uuid,
        plan_id -> Uuid,
        skill_id -> Nullable<Uuid>,
        title -> Text,
        target_date -> Nullable<Date>,
        priority -> Varchar,
        status -> Varchar,
        progress -> Numeric,
        linked_training_ids -> Array<Nullable<Text>>,
        linked_challenge_ids -> Array<Nullable<Text>>,
        linked_cognitive_test_ids -> Array<Nullable<Text>>,
        related_games -> Array<Nullable<Text>>,
        auto_progress_enabled -> Bool,
        xp_reward -> Int4,
        weight -> Numeric,
        last_auto_update -> Nullable<Timestamptz>,
        stagnant_since -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    goal_progress_events (id) {
        id -> Uuid,
        goal_id -> Uuid,
        user_id -> Uuid,
        source_type -> Varchar,
        source_id -> Nullable<Text>,
        source_name -> Nullable<Text>,
        progress_before -> Numeric,
        progress_after -> Numeric,
        progress_delta -> Numeric,
        xp_earned -> Int4,
        metadata -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    pdi_linked_actions (id) {
        id -> Uuid,
        goal_id -> Uuid,
        user_id -> Uuid,
        action_type -> Varchar,
        action_id -> Text,
        status -> Varchar,
        completed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    assessment_consequences (id) {
        id -> Uuid,
        org_id -> Nullable<Uuid>,
        user_id -> Uuid,
        consequence_type -> Varchar,
        target_type -> Varchar,
        target_id -> Nullable<Text>,
        title -> Text,
        priority -> Varchar,
        skill_ids -> Array<Nullable<Uuid>>,
        status -> Varchar,
        resolved_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    user_balances (user_id) {
        user_id -> Uuid,
        org_id -> Nullable<Uuid>,
        xp -> Int8,
        coins -> Int8,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    balance_transactions (id) {
        id -> Uuid,
        user_id -> Uuid,
        org_id -> Nullable<Uuid>,
        kind -> Varchar,
        xp_delta -> Int8,
        coins_delta -> Int8,
        source_type -> Nullable<Varchar>,
        source_id -> Nullable<Text>,
        metadata -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    reward_configs (id) {
        id -> Uuid,
        org_id -> Nullable<Uuid>,
        source_type -> Varchar,
        source_id -> Nullable<Text>,
        config -> Jsonb,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(development_goals -> development_plans (plan_id));
diesel::joinable!(goal_progress_events -> development_goals (goal_id));
diesel::joinable!(pdi_linked_actions -> development_goals (goal_id));

diesel::allow_tables_to_appear_in_same_query!(
    development_plans,
    development_goals,
    goal_progress_events,
    pdi_linked_actions,
);
