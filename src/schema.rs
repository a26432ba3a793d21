// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

/// Shared handle to a table schema.
pub type SchemaRef = Arc<Schema>;

/// The part of a table schema a fragment stream needs: its name and clustering columns.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub keyspace: String,
    pub table: String,
    pub clustering_columns: Vec<String>,
}

impl Schema {
    pub fn new(
        keyspace: impl ToString,
        table: impl ToString,
        clustering_columns: impl IntoIterator<Item = impl ToString>,
    ) -> Self {
        Self {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            clustering_columns: clustering_columns
                .into_iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }

    pub fn into_ref(self) -> SchemaRef {
        Arc::new(self)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.keyspace, self.table)
    }
}
