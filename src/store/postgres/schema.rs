// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

diesel::table! {
    favorites (id) {
        id -> Text,
        text -> Text,
        image -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}
