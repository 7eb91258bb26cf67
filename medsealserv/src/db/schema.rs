// Diesel schema definition for the medseal database
use diesel::table;
use diesel::allow_tables_to_appear_in_same_query;

table! {
    users (id) {
        id -> Integer,
        user_name -> Text,
        email -> Text,
        password_hash -> Text,
        role -> Text,
    }
}

table! {
    patients (id) {
        id -> Integer,
        first_name -> Text,
        last_name -> Text,
        date_of_birth -> Timestamp,
        email -> Text,
        medical_record -> Nullable<Text>,
        password_hash -> Nullable<Text>,
    }
}

allow_tables_to_appear_in_same_query!(
    users,
    patients,
);
