diesel::table! {
    pending_admins (id) {
        id -> Int4,
        email -> Varchar,
        status -> Varchar,
        approved_by -> Nullable<Varchar>,
        approved_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    sites (id) {
        id -> Int4,
        site_number -> Int4,
        full_name -> Varchar,
        short_name -> Varchar,
        latitude -> Numeric,
        longitude -> Numeric,
        elevation -> Int4,
        description -> Text,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    user_account (id) {
        id -> Uuid,
        email -> Varchar,
        password_hash -> Varchar,
        created_at -> Timestamp,
    }
}

diesel::table! {
    water_quality (id) {
        id -> Int4,
        site -> Varchar,
        date -> Date,
        dissolved_oxygen_mg -> Nullable<Float8>,
        dissolved_oxygen_sat -> Nullable<Float8>,
        hardness -> Nullable<Float8>,
        alkalinity -> Nullable<Float8>,
        ph -> Nullable<Float8>,
        temperature -> Nullable<Float8>,
        flow -> Nullable<Float8>,
        notes -> Text,
        user_id -> Uuid,
        created_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    pending_admins,
    sites,
    user_account,
    water_quality,
);
