//! Tables behind [`super::PgInvitationStore`].

pub const SCHEMA_UP: &str = "
create table if not exists invitation_users (
  id uuid not null primary key,
  inviter uuid not null unique,
  invitations_remaining integer not null
);

create table if not exists invitation_keys (
  id uuid not null primary key,
  key varchar(40) not null unique,
  created_at timestamptz not null default current_timestamp,
  from_user uuid not null,
  uses_left integer not null default 1,
  duration_days integer not null
);

create table if not exists invitation_key_registrants (
  invitation_key_id uuid not null references invitation_keys(id) on delete cascade,
  registrant_id uuid not null,
  primary key (invitation_key_id, registrant_id)
);";

pub const SCHEMA_DOWN: &str = "
drop table if exists invitation_key_registrants;
drop table if exists invitation_keys;
drop table if exists invitation_users;";
