// Mirrors the tables created by src/migrations.

diesel::table! {
    extensions (id) {
        id -> Integer,
        identifier -> Text,
        name -> Nullable<Text>,
        description -> Nullable<Text>,
        version -> Nullable<Text>,
        author -> Nullable<Text>,
        url -> Nullable<Text>,
        downloads -> Nullable<BigInt>,
        installs -> Nullable<BigInt>,
        last_updated -> Nullable<Text>,
        categories -> Nullable<Text>,
        rating -> Nullable<Double>,
        review_count -> Nullable<Text>,
        tags -> Nullable<Text>,
        repository -> Nullable<Text>,
        license -> Nullable<Text>,
        local_path -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
        is_created -> Integer,
    }
}
