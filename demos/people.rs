//! Serves a small `people` service with two operations.
//!
//! ```text
//! SOAP_SERVICE_NAME=people cargo run --example people
//! curl 'http://127.0.0.1:8080/people?wsdl'
//! ```

use serde::{Deserialize, Serialize};
use soap_rpc_server::{
    config::Config, logging, FieldKind, FieldSchema, Fault, Operation, Schema, ServerError,
    ServiceDescriptor, SoapServer,
};

#[derive(Debug, Deserialize)]
struct UserIn {
    #[serde(rename = "Id")]
    id: i64,
}

impl Schema for UserIn {
    fn kind() -> FieldKind {
        FieldKind::Struct(vec![FieldSchema::of::<i64>("Id")])
    }
}

#[derive(Debug, Serialize)]
struct UserOut {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Sex")]
    sex: i32,
    #[serde(rename = "Address")]
    address: String,
}

impl Schema for UserOut {
    fn kind() -> FieldKind {
        FieldKind::Struct(vec![
            FieldSchema::of::<i64>("Id"),
            FieldSchema::of::<String>("Name"),
            FieldSchema::of::<i32>("Sex"),
            FieldSchema::of::<String>("Address").tagged("address"),
        ])
    }
}

struct User;

impl Operation for User {
    const NAME: &'static str = "User";
    type In = UserIn;
    type Out = UserOut;

    fn action(&self, input: UserIn) -> Result<UserOut, Fault> {
        if input.id != 100 {
            return Err(Fault::new("InvalidInput", "id must be 100", ""));
        }

        Ok(UserOut {
            id: input.id,
            name: "Afocus".to_string(),
            sex: 1,
            address: "Xi'an".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DataListIn {
    #[serde(rename = "Page")]
    page: i32,
    #[serde(rename = "PerPage")]
    per_page: i32,
    #[serde(rename = "Search", default)]
    search: String,
}

impl Schema for DataListIn {
    fn kind() -> FieldKind {
        FieldKind::Struct(vec![
            FieldSchema::of::<i32>("Page").tagged(",required"),
            FieldSchema::of::<i32>("PerPage"),
            FieldSchema::of::<String>("Search"),
        ])
    }
}

#[derive(Debug, Serialize)]
struct Item {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "Name")]
    name: String,
}

impl Schema for Item {
    fn kind() -> FieldKind {
        FieldKind::Struct(vec![
            FieldSchema::of::<i64>("Id"),
            FieldSchema::of::<String>("Name"),
        ])
    }
}

#[derive(Debug, Serialize)]
struct DataListOut {
    #[serde(rename = "Total")]
    total: i32,
    #[serde(rename = "Items")]
    items: Vec<Item>,
}

impl Schema for DataListOut {
    fn kind() -> FieldKind {
        FieldKind::Struct(vec![
            FieldSchema::of::<i32>("Total"),
            FieldSchema::of::<Vec<Item>>("Items"),
        ])
    }
}

struct DataList;

impl Operation for DataList {
    const NAME: &'static str = "DataList";
    type In = DataListIn;
    type Out = DataListOut;

    fn action(&self, input: DataListIn) -> Result<DataListOut, Fault> {
        let per_page = input.per_page.clamp(1, 50);
        let first = i64::from(input.page.max(0)) * i64::from(per_page);
        let items = (first..first + i64::from(per_page))
            .map(|id| Item {
                id,
                name: format!("{}{id}", input.search),
            })
            .collect();

        Ok(DataListOut {
            total: per_page,
            items,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;

    let mut server = SoapServer::new(config.server_config());
    server.register_many([
        ServiceDescriptor::from_operation(User),
        ServiceDescriptor::from_operation(DataList),
    ])?;

    server.serve(bind_socket).await
}
